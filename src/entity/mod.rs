pub mod audit_logs;
pub mod baskets;
pub mod notifications;
pub mod orders;
pub mod payments;
pub mod shops;
pub mod users;

pub use audit_logs::Entity as AuditLogs;
pub use baskets::Entity as Baskets;
pub use notifications::Entity as Notifications;
pub use orders::Entity as Orders;
pub use payments::Entity as Payments;
pub use shops::Entity as Shops;
pub use users::Entity as Users;
