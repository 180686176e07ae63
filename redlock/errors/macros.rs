/// A macro for building an [`error_stack::Report`] from a context, with an
/// optional formatted message attached.
#[macro_export]
macro_rules! err {
    ($ctx:expr) => {{
        error_stack::Report::new($ctx)
    }};

    ($ctx:expr, $str:expr) => {{
        error_stack::Report::new($ctx).attach_printable($str)
    }};

    ($ctx:expr, $str:expr, $($arg:expr),*) => {{
        error_stack::Report::new($ctx).attach_printable(format!($str, $($arg),*))
    }};
}

/// [`err!`] specialised to [`AnyErr`](crate::errors::AnyErr), mainly useful
/// in tests.
#[macro_export]
macro_rules! anyerr {
    () => {{
        error_stack::Report::new($crate::errors::AnyErr)
    }};

    ($str:expr) => {{
        error_stack::Report::new($crate::errors::AnyErr).attach_printable($str)
    }};

    ($str:expr, $($arg:expr),*) => {{
        error_stack::Report::new($crate::errors::AnyErr).attach_printable(format!($str, $($arg),*))
    }};
}
