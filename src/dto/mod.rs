pub mod baskets;
pub mod notifications;
pub mod orders;
pub mod payments;
