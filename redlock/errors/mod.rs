mod any;
mod lock_err;
mod macros;

pub use any::AnyErr;
pub use lock_err::LockErr;

pub(crate) mod prelude {
    #[allow(unused_imports)]
    pub use error_stack::{bail, report, Result, ResultExt};

    pub use super::{AnyErr, LockErr};
}
