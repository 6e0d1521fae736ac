pub(crate) mod order_handlers;
pub(crate) mod payment_handlers;
