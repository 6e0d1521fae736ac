use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OrderDecisionRequest {
    #[validate(length(min = 1, message = "Action is required"))]
    pub action: String,
    pub truck_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RateOrderRequest {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i32,

    #[validate(length(max = 1000, message = "Review must be at most 1000 characters"))]
    pub review: Option<String>,
}
