// Service orders and the statistics computed over them
pub mod service_orders;
pub mod statistics;

// Accounts, groups and permissions
pub mod users;
