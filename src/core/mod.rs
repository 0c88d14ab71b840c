pub mod checkout_manager;
pub mod settings;

pub use checkout_manager::{CheckoutManager, CheckoutSummary};
pub use settings::{CheckoutSettings, SubmoduleMode};
