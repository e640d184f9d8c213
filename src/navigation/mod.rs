mod controller;

pub use controller::{Advance, NavigationController};
