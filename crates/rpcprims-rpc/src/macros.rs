/// Generate the typed pieces of one RPC interface.
///
/// ```
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct Hi {
///     pub user_name: String,
///     pub say_msg: String,
/// }
///
/// rpcprims_rpc::service! {
///     /// Greeting service.
///     pub mod hello("demo.HelloService") {
///         async fn hi() -> String;
///         async fn say(msg: String) -> String;
///         async fn say_hi(hi: Hi) -> String;
///     }
/// }
///
/// struct Greeter;
///
/// #[rpcprims_rpc::async_trait]
/// impl hello::Service for Greeter {
///     async fn hi(&self) -> rpcprims_rpc::Result<String> {
///         Ok("hi".to_string())
///     }
///     async fn say(&self, msg: String) -> rpcprims_rpc::Result<String> {
///         Ok(msg)
///     }
///     async fn say_hi(&self, hi: Hi) -> rpcprims_rpc::Result<String> {
///         Ok(format!("{} say: {}", hi.user_name, hi.say_msg))
///     }
/// }
///
/// fn main() {
///     let export = hello::export(Greeter);
///     assert_eq!(export.interface_name(), hello::INTERFACE);
///     assert_eq!(export.signatures().len(), 3);
/// }
/// ```
///
/// The module contains:
///
/// - `INTERFACE`, the registry key;
/// - `Service`, the async trait both sides implement;
/// - `Client`, a [`RemoteStub`](crate::RemoteStub)-backed `Service`;
/// - `export(implementation)`, which builds the implementation's
///   [`ServiceExport`](crate::ServiceExport).
///
/// Methods are keyed by name and by the spelling of their parameter types,
/// so both ends must be generated from the same declaration.
#[macro_export]
macro_rules! service {
    (
        $(#[$attr:meta])*
        $vis:vis mod $module:ident ($interface:literal) {
            $(
                $(#[$method_attr:meta])*
                async fn $method:ident ( $( $arg:ident : $arg_ty:ty ),* $(,)? ) -> $ret:ty ;
            )*
        }
    ) => {
        $(#[$attr])*
        $vis mod $module {
            #[allow(unused_imports)]
            use super::*;

            /// Interface name this service is registered under.
            pub const INTERFACE: &str = $interface;

            #[$crate::__private::async_trait]
            pub trait Service: Send + Sync + 'static {
                $(
                    $(#[$method_attr])*
                    async fn $method(&self $(, $arg: $arg_ty)*) -> $crate::Result<$ret>;
                )*
            }

            /// Remote implementation of [`Service`].
            #[derive(Debug, Clone)]
            pub struct Client {
                stub: $crate::RemoteStub,
            }

            impl Client {
                pub fn new(stub: $crate::RemoteStub) -> Self {
                    Self { stub }
                }

                pub fn stub(&self) -> &$crate::RemoteStub {
                    &self.stub
                }
            }

            impl $crate::RemoteService for Client {
                const INTERFACE: &'static str = INTERFACE;

                fn from_stub(stub: $crate::RemoteStub) -> Self {
                    Self::new(stub)
                }
            }

            #[$crate::__private::async_trait]
            impl Service for Client {
                $(
                    async fn $method(&self $(, $arg: $arg_ty)*) -> $crate::Result<$ret> {
                        let arguments: ::std::vec::Vec<::std::vec::Vec<u8>> = ::std::vec![
                            $( self.stub.codec().serialize(&$arg)? ),*
                        ];
                        let parameter_types: ::std::vec::Vec<::std::string::String> = ::std::vec![
                            $( ::std::string::String::from(::core::stringify!($arg_ty)) ),*
                        ];
                        self.stub
                            .invoke(::core::stringify!($method), parameter_types, arguments)
                            .await
                    }
                )*
            }

            /// Dispatch table for `implementation`.
            pub fn export<S: Service>(implementation: S) -> $crate::ServiceExport {
                #[allow(unused_variables)]
                let implementation = ::std::sync::Arc::new(implementation);
                $crate::ServiceExport::new(INTERFACE)
                $(
                    .method(
                        ::core::stringify!($method),
                        &[$( ::core::stringify!($arg_ty) ),*],
                        {
                            let implementation = ::std::sync::Arc::clone(&implementation);
                            $crate::__private::handler(move |codec, arguments| {
                                let implementation = ::std::sync::Arc::clone(&implementation);
                                ::std::boxed::Box::pin(async move {
                                    #[allow(unused_mut, unused_variables)]
                                    let mut arguments = arguments.into_iter();
                                    $(
                                        let $arg: $arg_ty = $crate::__private::next_argument(
                                            codec,
                                            &mut arguments,
                                            ::core::stringify!($arg),
                                        )?;
                                    )*
                                    let value = implementation.$method($($arg),*).await?;
                                    $crate::__private::encode_return(codec, &value)
                                })
                            })
                        },
                    )
                )*
            }
        }
    };
}
