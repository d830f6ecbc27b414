pub mod location;
pub mod payment;
pub mod rating;
pub mod ride;
pub mod ride_cancel;
pub mod ride_request;
pub mod user;
pub mod vehicle;
pub mod wallet;
pub mod wallet_transaction;
