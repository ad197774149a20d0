//! Page flows of the maintenance portal.
//!
//! The portal is a frameset: navigation and search live in the `botleft`
//! frame, search results render into `botright`. Result pages are plain
//! tables, so fields are located by fixed XPaths.

use crate::error::{AuthError, ExtractionError};
use std::time::Duration;
use tracing::{debug, info, warn};
use wosync_browser::{BrowserActions, BrowserError, Locator};
use wosync_core::{BrowserConfig, FieldMap, Identity, ItemKind, PortalConfig, WorkItem};

/// Frame holding the category dropdown and search box.
pub const NAV_FRAME: &str = "botleft";

/// Frame the search results render into.
pub const RESULTS_FRAME: &str = "botright";

const CATEGORY_SELECT: &str = "select[name='Search']";
const SEARCH_INPUT: &str = "input[name='WorkOrderNumber']";
const SEARCH_BUTTON: &str = "input[src='images/arrowbutton.gif']";

const REQUEST_ANCHOR: &str = "room";
const REQUEST_ANCHOR_XPATH: &str = "//tr[3]/td[1]/p/font/b";
const ORDER_ANCHOR_XPATH: &str = "/html/body/table/tbody";

const REQUEST_LOCATORS: &[(&str, &str)] = &[
    (REQUEST_ANCHOR, REQUEST_ANCHOR_XPATH),
    ("status", "//tr[3]/td[2]/strong/font"),
    ("building", "/html/body/table/tbody/tr[2]/td[2]"),
    ("tag", "/html/body/table/tbody/tr[3]/td[2]"),
    ("accept_date", "/html/body/table/tbody/tr[4]/td[2]"),
    ("reject_date", "/html/body/table/tbody/tr[5]/td[2]"),
    ("reject_reason", "/html/body/table/tbody/tr[6]/td[2]"),
    ("location", "/html/body/table/tbody/tr[2]/td[4]"),
    ("item_description", "/html/body/table/tbody/tr[3]/td[4]"),
    ("work_order_num", "/html/body/table/tbody/tr[4]/td[4]"),
    ("area_description", "/html/body/table/tbody/tr[5]/td[4]"),
    ("requested_action", "/html/body/table/tbody/tr[8]/td[2]"),
];

const ORDER_LOCATORS: &[(&str, &str)] = &[
    ("facility", "/html/body/table/tbody/tr[6]/td[2]"),
    ("building", "/html/body/table/tbody/tr[7]/td[2]"),
    ("location_id", "/html/body/table/tbody/tr[8]/td[2]"),
    ("priority", "/html/body/table/tbody/tr[9]/td[2]"),
    ("request_date", "/html/body/table/tbody/tr[10]/td[2]"),
    ("schedule_date", "/html/body/table/tbody/tr[11]/td[2]"),
    ("work_status", "/html/body/table/tbody/tr[12]/td[2]"),
    ("date_closed", "/html/body/table/tbody/tr[13]/td[2]"),
    ("main_charge_account", "/html/body/table/tbody/tr[14]/td[2]"),
    ("task_code", "/html/body/table/tbody/tr[15]/td[2]/font"),
    ("reference_number", "/html/body/table/tbody/tr[6]/td[4]"),
    ("tag_number", "/html/body/table/tbody/tr[8]/td[4]"),
    ("item_description", "/html/body/table/tbody/tr[9]/td[4]"),
    ("request_time", "/html/body/table/tbody/tr[10]/td[4]"),
    ("date_last_posted", "/html/body/table/tbody/tr[11]/td[4]"),
    ("trade", "/html/body/table/tbody/tr[12]/td[4]"),
    ("contractor_name", "/html/body/table/tbody/tr[13]/td[4]"),
    ("est_completion_date", "/html/body/table/tbody/tr[14]/td[4]"),
    ("task_description", "/html/body/table/tbody/tr[15]/td[3]/font"),
    ("requested_action", "/html/body/table/tbody/tr[17]/td[2]"),
    ("corrective_action", "/html/body/table/tbody/tr[18]/td[2]"),
];

/// Field name to XPath in the results frame, for one kind.
pub(crate) fn field_locators(kind: ItemKind) -> &'static [(&'static str, &'static str)] {
    match kind {
        ItemKind::Request => REQUEST_LOCATORS,
        ItemKind::Order => ORDER_LOCATORS,
    }
}

/// XPath whose presence means the item exists.
pub(crate) fn anchor_xpath(kind: ItemKind) -> &'static str {
    match kind {
        ItemKind::Request => REQUEST_ANCHOR_XPATH,
        ItemKind::Order => ORDER_ANCHOR_XPATH,
    }
}

/// Portal identifiers and wait bounds used by the flows below.
#[derive(Debug, Clone)]
pub struct PortalSettings {
    /// Where login starts
    pub login_url: String,
    /// Title of the credentials page
    pub login_title: String,
    /// Title of the second-factor page
    pub second_factor_title: String,
    /// Title of the page shown once logged in
    pub landing_title: String,
    /// Id of the "trust this browser" button
    pub trust_button_id: String,
    /// How long a trusted profile may take to land
    pub trust_check: Duration,
    /// How long to wait for second-factor approval
    pub second_factor_timeout: Duration,
    /// Upper bound on any other page wait
    pub page_timeout: Duration,
}

impl PortalSettings {
    /// Settings from the portal and browser sections of the config.
    pub fn from_config(portal: &PortalConfig, browser: &BrowserConfig) -> Self {
        Self {
            login_url: portal.login_url.clone(),
            login_title: portal.login_title.clone(),
            second_factor_title: portal.second_factor_title.clone(),
            landing_title: portal.landing_title.clone(),
            trust_button_id: portal.trust_button_id.clone(),
            trust_check: browser.trust_check(),
            second_factor_timeout: browser.second_factor_timeout(),
            page_timeout: browser.navigation_timeout(),
        }
    }
}

/// Log in, completing the second factor if the profile is not yet trusted.
///
/// A trusted profile reaches the landing page within `trust_check`. Otherwise
/// the portal shows the second-factor page and the user has
/// `second_factor_timeout` to approve the push; the "trust this browser"
/// button is then clicked so later logins through this profile skip it.
pub async fn login<B: BrowserActions + ?Sized>(
    browser: &B,
    identity: &Identity,
    settings: &PortalSettings,
) -> Result<(), AuthError> {
    browser.navigate(&settings.login_url).await?;

    if browser.title().await? == settings.login_title {
        debug!("Submitting credentials for {}", identity.username());
        browser
            .fill_field(&Locator::id("username"), identity.username())
            .await?;
        browser
            .fill_field(&Locator::id("password"), identity.secret())
            .await?;
        browser.click(&Locator::id("submit")).await?;
    }

    match browser
        .wait_for_title(&settings.landing_title, settings.trust_check)
        .await
    {
        Ok(()) => {
            info!("Logged in with a trusted profile");
            return Ok(());
        }
        Err(BrowserError::Timeout(_)) => {}
        Err(e) => return Err(e.into()),
    }

    let title = browser.title().await?;
    if title != settings.second_factor_title {
        return Err(AuthError::Rejected { title });
    }

    warn!(
        "Second factor required, approve the request within {:?}",
        settings.second_factor_timeout
    );
    let trust_button = Locator::id(&settings.trust_button_id);
    match browser
        .wait_for_selector(&trust_button, settings.second_factor_timeout)
        .await
    {
        Ok(()) => {}
        Err(BrowserError::Timeout(_)) => {
            return Err(AuthError::SecondFactorTimeout(settings.second_factor_timeout))
        }
        Err(e) => return Err(e.into()),
    }
    browser.click(&trust_button).await?;

    match browser
        .wait_for_title(&settings.landing_title, settings.page_timeout)
        .await
    {
        Ok(()) => {
            info!("Second factor approved, profile is now trusted");
            Ok(())
        }
        Err(BrowserError::Timeout(_)) => Err(AuthError::Rejected {
            title: browser.title().await?,
        }),
        Err(e) => Err(e.into()),
    }
}

/// Point the search dropdown at `kind`.
pub async fn select_category<B: BrowserActions + ?Sized>(
    browser: &B,
    kind: ItemKind,
    settings: &PortalSettings,
) -> Result<(), BrowserError> {
    let dropdown = Locator::css(CATEGORY_SELECT).in_frame(NAV_FRAME);
    browser
        .wait_for_selector(&dropdown, settings.page_timeout)
        .await?;
    browser.select_option(&dropdown, kind.category_code()).await
}

/// Submit a search for `query` and wait for the results frame to show it.
///
/// The current results document is tagged first. The frame still holds the
/// previous item's page right after the click, so only a document without
/// the tag counts as the answer to this search.
pub async fn search<B: BrowserActions + ?Sized>(
    browser: &B,
    query: &str,
    settings: &PortalSettings,
) -> Result<(), BrowserError> {
    let results = Locator::css("html").in_frame(RESULTS_FRAME);
    match browser.mark_stale(&results).await {
        Ok(()) => {}
        Err(e) if e.is_missing_element() => debug!("No results page to replace yet"),
        Err(e) => return Err(e),
    }

    browser
        .fill_field(&Locator::css(SEARCH_INPUT).in_frame(NAV_FRAME), query)
        .await?;
    browser
        .click(&Locator::css(SEARCH_BUTTON).in_frame(NAV_FRAME))
        .await?;
    browser
        .wait_for_reload(&results, settings.page_timeout)
        .await
}

/// Read every field of `item` from the results frame.
///
/// Fails when the anchor is absent, meaning the item does not exist. Any other
/// field that cannot be located is recorded as `None`.
pub async fn extract<B: BrowserActions + ?Sized>(
    browser: &B,
    item: &WorkItem,
) -> Result<FieldMap, ExtractionError> {
    let kind = item.kind();
    let browser_error = |source| ExtractionError::Browser {
        item: item.key(),
        source,
    };

    let anchor = Locator::xpath(anchor_xpath(kind)).in_frame(RESULTS_FRAME);
    let mut fields = FieldMap::new();

    match kind {
        ItemKind::Request => match browser.extract_text(&anchor).await {
            Ok(text) => {
                let room = clean(&text);
                let room = room.strip_prefix("for ").unwrap_or(&room).to_string();
                fields.insert(REQUEST_ANCHOR.to_string(), Some(room));
            }
            Err(e) if e.is_missing_element() => {
                return Err(ExtractionError::NotFound {
                    item: item.key(),
                    reason: e.to_string(),
                })
            }
            Err(e) => return Err(browser_error(e)),
        },
        ItemKind::Order => {
            let present = match browser.is_present(&anchor).await {
                Ok(present) => present,
                Err(e) if e.is_missing_element() => false,
                Err(e) => return Err(browser_error(e)),
            };
            if !present {
                return Err(ExtractionError::NotFound {
                    item: item.key(),
                    reason: "results table absent".to_string(),
                });
            }
        }
    }

    for (name, xpath) in field_locators(kind) {
        if fields.contains_key(*name) {
            continue;
        }
        let locator = Locator::xpath(*xpath).in_frame(RESULTS_FRAME);
        let value = match browser.extract_text(&locator).await {
            Ok(text) => Some(clean(&text)),
            Err(e) if e.is_missing_element() => {
                debug!("{}: field '{}' not on page", item, name);
                None
            }
            Err(e) => return Err(browser_error(e)),
        };
        fields.insert((*name).to_string(), value);
    }

    Ok(fields)
}

/// Trim surrounding whitespace and commas from cell text.
fn clean(text: &str) -> String {
    text.trim_matches(|c: char| c.is_whitespace() || c == ',')
        .to_string()
}
