//! Declarative helpers shared across the crate.

/// Declares device error-code constants together with a lookup table of
/// human readable messages.
///
/// Expands to one `pub const` per entry and a `get_error_message` function.
macro_rules! define_error_codes {
    ($($name:ident = $code:expr => $msg:expr),* $(,)?) => {
        $(
            pub const $name: i64 = $code;
        )*

        /// Returns the message associated with a device error code.
        pub fn get_error_message(code: i64) -> &'static str {
            $(
                if code == $name {
                    return $msg;
                }
            )*
            "Unknown device error"
        }
    };
}

/// Implements [`RpcResult`](crate::error::RpcResult) for response types that
/// embed an [`RpcStatus`](crate::error::RpcStatus) in a field named `status`.
macro_rules! impl_rpc_result {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::error::RpcResult for $ty {
                fn status(&self) -> &$crate::error::RpcStatus {
                    &self.status
                }

                fn status_mut(&mut self) -> &mut $crate::error::RpcStatus {
                    &mut self.status
                }
            }
        )*
    };
}
