pub mod userdtos;

pub use userdtos::*;
