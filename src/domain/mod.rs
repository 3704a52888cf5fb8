pub mod bundle;
pub mod fingerprint;
pub mod forecast;
pub mod types;

pub use bundle::*;
pub use fingerprint::*;
pub use forecast::*;
pub use types::*;
