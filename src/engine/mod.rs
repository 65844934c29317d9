pub mod delivery;
pub mod lifecycle;
pub mod otp;
pub mod pharmacist;
pub mod pricing;
pub mod settlement;
pub mod surge;
