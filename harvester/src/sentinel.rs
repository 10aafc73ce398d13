//! Terminal-state detection on the listing page.

use tracing::debug;

use crate::controls::{MESSAGE_AREA_ID, NO_DATA_SENTINEL};
use crate::driver::PageDriver;

/// True when the portal's message banner says the query matched nothing.
/// An absent banner or a failed read is not a sentinel; only the exact
/// message text counts.
pub async fn no_data_sentinel_present(driver: &dyn PageDriver) -> bool {
    let banner = match driver.find_by_id(MESSAGE_AREA_ID).await {
        Ok(Some(handle)) => handle,
        Ok(None) => return false,
        Err(e) => {
            debug!(error = %e, "message banner lookup failed");
            return false;
        }
    };
    match driver.text_of(banner).await {
        Ok(text) => text.contains(NO_DATA_SENTINEL),
        Err(e) => {
            debug!(error = %e, "message banner read failed");
            false
        }
    }
}
