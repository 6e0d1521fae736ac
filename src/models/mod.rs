pub mod order;
pub mod payment_method;
pub mod transaction;
pub mod truck;
pub mod user;
