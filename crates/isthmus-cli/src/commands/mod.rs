pub mod check;
pub mod checksum;
pub mod inspect;
