pub mod order_dtos;
pub mod payment_dtos;
