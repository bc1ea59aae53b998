pub mod navigation;
pub mod ui;
