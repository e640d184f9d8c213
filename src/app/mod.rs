mod auth;
mod flow;
mod startup;

#[cfg(test)]
mod tests;

pub use auth::AuthState;
pub use flow::{ScreeningFlow, ScreeningFlowBuilder};
