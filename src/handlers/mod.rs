pub mod access;
pub mod responses;
pub mod skin;
