//! Control catalogue for the order portal.
//!
//! Every page control the engine touches is defined here, in one place, as a
//! [`LocatorSpec`] carrying its stable identifier plus fallback strategies.
//! The id strings mirror the portal's server-generated markup; when a
//! deployment shifts them, the text and keyword tiers keep the run alive.

use crate::locator::LocatorSpec;

/// Fragment shared by every row link in the order listing grid.
pub const ORDER_ROW_ID_FRAGMENT: &str = "_ImpDateLinkButton";

/// Identifier of the message banner the portal renders status text into.
pub const MESSAGE_AREA_ID: &str = "ctl00_messageArea_RepeatMessage_ctl00_messageLabel";

/// Banner text meaning the listing query matched nothing.
pub const NO_DATA_SENTINEL: &str = "該当するデータがありません";

/// Substrings whose presence after a login attempt means it was rejected.
pub const LOGIN_ERROR_MARKERS: [&str; 3] = ["エラー", "失敗", "無効"];

/// Status-filter option restricting the listing to referenced orders.
pub const STATUS_REFERENCED: &str = "0";

/// Print-kind option for the delivery list (D) document.
pub const PRINT_KIND_DELIVERY_LIST_D: &str = "0400";

/// Link shown when a stale session lingers; clicking it forces a fresh login.
pub fn relogin_link() -> LocatorSpec {
    LocatorSpec::new("relogin link")
        .stable_id("LogoutLinkButton")
        .visible_text("再ログイン")
}

pub fn org_code_field() -> LocatorSpec {
    LocatorSpec::new("organization code field").stable_id("FormView2_CorpCdTextBox")
}

pub fn login_id_field() -> LocatorSpec {
    LocatorSpec::new("login id field").stable_id("FormView1_LoginIdTextBox")
}

pub fn password_field() -> LocatorSpec {
    LocatorSpec::new("password field").stable_id("FormView1_LoginPwTextBox")
}

pub fn login_button() -> LocatorSpec {
    LocatorSpec::new("login button")
        .stable_id("FormView1_btnLogin")
        .keywords(["ログイン"])
}

/// The single customer/branch link on the post-login context page.
pub fn context_link() -> LocatorSpec {
    LocatorSpec::new("context link")
        .stable_id("ctl00_ContentPlaceHolder1_GridView1_ctl02_Label21")
}

pub fn orders_tab() -> LocatorSpec {
    LocatorSpec::new("orders tab")
        .stable_id("ctl00_tab3link")
        .visible_text("受注一覧")
}

pub fn status_filter() -> LocatorSpec {
    LocatorSpec::new("status filter")
        .stable_id("ctl00_ContentPlaceHolder1_FormView1_DeciDropDownList")
}

pub fn search_button() -> LocatorSpec {
    LocatorSpec::new("search button")
        .stable_id("ctl00_ContentPlaceHolder1_FormView1_Button1")
        .keywords(["検索"])
}

/// Exports the whole listing as CSV; used once per run for the audit copy.
pub fn listing_export_button() -> LocatorSpec {
    LocatorSpec::new("listing export button")
        .stable_id("ctl00_ContentPlaceHolder1_DownloadButton")
        .keywords(["CSV", "ダウンロード"])
}

pub fn print_kind_select() -> LocatorSpec {
    LocatorSpec::new("print kind select")
        .stable_id("ctl00_ContentPlaceHolder1_FormView2_PrintKindDropDownList")
}

pub fn download_button() -> LocatorSpec {
    LocatorSpec::new("download button")
        .stable_id("ctl00_ContentPlaceHolder1_FormView2_PrintButton")
        .keywords(["ダウンロード", "印刷"])
}

pub fn confirm_checkbox() -> LocatorSpec {
    LocatorSpec::new("confirm checkbox").stable_id("ctl00_ContentPlaceHolder1_baseCheckbox1")
}

pub fn confirm_button() -> LocatorSpec {
    LocatorSpec::new("confirm button")
        .stable_id("ctl00_ContentPlaceHolder1_DecideButton")
        .keywords(["確定"])
}
