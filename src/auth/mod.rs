mod claims;
pub mod jwt;
