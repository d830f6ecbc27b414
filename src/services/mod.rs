pub mod booking;
pub mod fare;
pub mod lifecycle;
pub mod notify;
pub mod otp;
pub mod payment;
pub mod rating;
pub mod wallet;
