pub mod images;
pub mod layout;
pub mod library;
pub mod prefetch;
