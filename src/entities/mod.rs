pub mod group;
pub mod group_permission;
pub mod permission;
pub mod service_order;
pub mod user;
pub mod user_group;
pub mod user_permission;
