pub mod actor;
pub mod assignment;
pub mod delivery;
pub mod order;
pub mod refund;
