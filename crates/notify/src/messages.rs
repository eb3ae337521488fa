//! Message templates for workflow notifications. Kept in one place so the
//! wording stays consistent between the service and the sweep.

use chrono::{DateTime, Utc};

use travo_core::domain::travel_request::TravelRequest;

pub fn request_receipt(request: &TravelRequest) -> String {
    format!("Your travel request \"{}\" has been submitted for validation.", request.purpose)
}

pub fn submitted_for_validation(request: &TravelRequest) -> String {
    format!(
        "{} submitted a travel request \"{}\" for your validation.",
        request.requester.full_name(),
        request.purpose
    )
}

pub fn request_approved(request: &TravelRequest, code: &str, expiration: DateTime<Utc>) -> String {
    format!(
        "Your travel request \"{}\" has been approved. Security Code: {} (valid until {}).",
        request.purpose,
        code,
        expiration.format("%Y-%m-%d")
    )
}

pub fn request_rejected(request: &TravelRequest) -> String {
    format!("Your travel request \"{}\" has been rejected.", request.purpose)
}

pub fn forwarded_for_review(request: &TravelRequest) -> String {
    format!(
        "Travel request \"{}\" by {} was validated and awaits your final review.",
        request.purpose,
        request.requester.full_name()
    )
}

pub fn remarks_added(request: &TravelRequest, remarks: &str) -> String {
    format!("Remarks were added to your travel request \"{}\": {remarks}", request.purpose)
}

/// Consolidated per-requester expiry text. Singular and plural read
/// differently; the original codes travel in the notification metadata, not
/// in the message body.
pub fn codes_expired(count: usize) -> String {
    if count == 1 {
        "Your travel security code has expired. Contact the division office if travel is still \
         pending."
            .to_string()
    } else {
        format!(
            "{count} of your travel security codes have expired. Contact the division office if \
             travel is still pending."
        )
    }
}

pub fn travel_completed(count: usize) -> String {
    if count == 1 {
        "Your travel window has ended and the request was marked completed.".to_string()
    } else {
        format!("{count} of your travel windows have ended and the requests were marked completed.")
    }
}
