pub mod health;
pub use self::health::health;

pub mod authorize;
pub use self::authorize::authorize;
