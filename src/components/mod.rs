pub mod history;
pub mod layers;
