pub mod symbol;
pub mod ticker;

pub use symbol::Symbol;
pub use ticker::Ticker;
