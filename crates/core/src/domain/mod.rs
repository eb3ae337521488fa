pub mod notification;
pub mod travel_request;
pub mod user;
