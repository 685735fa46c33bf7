pub mod configured_model;
pub mod issued_key;
pub mod price_point;
pub mod usage_record;
pub mod user;
