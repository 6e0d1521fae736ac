pub mod fcm_service;
pub mod notification_service;
pub mod order_service;
pub mod payment_method_service;
pub mod paystack_service;
pub mod reconciliation_service;
pub mod sms_service;
pub mod transaction_service;
