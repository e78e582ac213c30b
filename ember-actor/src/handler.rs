/*
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0.
 *
 * Unless required by applicable law or agreed to in writing, software distributed under
 * the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND,
 * either express or implied. See the License for the specific language governing permissions
 * and limitations under the License.
 */

//! The funcName -> adapter registry that replaces reflection-driven
//! dispatch: each actor type builds its bindings once, from ordinary
//! closures, at construction time.

use std::any::Any;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::ActorError;
use crate::invocation::{Args, InvokeOutcome, SessionContext};
use crate::system::ActorContext;

/// Decode an [`Args`] value into `T`, taking the zero-copy typed path for
/// local calls and falling back to the negotiated serializer for
/// cluster-originated ones.
pub fn decode_args<T: DeserializeOwned + Send + 'static>(args: Args) -> Result<T, ActorError> {
    match args {
        Args::Typed(boxed) => {
            let any: Box<dyn Any> = boxed;
            any.downcast::<T>()
                .map(|b| *b)
                .map_err(|_| ActorError::Decode(format!("argument type mismatch, expected {}", std::any::type_name::<T>())))
        }
        Args::Encoded(bytes) => ember_proto::serializer::decode_json(&bytes).map_err(|e| ActorError::Decode(e.to_string())),
    }
}

pub fn encode_response<T: Serialize>(value: &T) -> Result<Bytes, ActorError> {
    ember_proto::serializer::encode_json(value).map_err(|e| ActorError::Decode(e.to_string()))
}

/// `session` is `Some` only for a connector-delivered local invocation;
/// cluster-originated and actor-to-actor calls always pass `None`.
pub type BindingFn<H> = Box<dyn Fn(&mut H, &ActorContext, Args, Option<&dyn SessionContext>) -> InvokeOutcome + Send + Sync>;

pub struct Binding<H> {
    pub func_name: &'static str,
    pub call: BindingFn<H>,
}

impl<H> Binding<H> {
    pub fn new(func_name: &'static str, call: BindingFn<H>) -> Self {
        Binding { func_name, call }
    }
}

/// Implemented by actor state types. `bindings()` is called exactly once,
/// when the actor is spawned, to build its `funcName -> adapter` table.
pub trait ActorHandler: Send + 'static {
    fn on_init(&mut self, _ctx: &ActorContext) {}
    fn on_stop(&mut self, _ctx: &ActorContext) {}

    /// Consulted when a message targets a not-yet-known child path;
    /// returning `true` means the child should now be considered present.
    fn on_find_child(&mut self, _child_id: &str, _ctx: &ActorContext) -> bool {
        false
    }

    fn bindings() -> Vec<Binding<Self>>
    where
        Self: Sized;
}

/// Helper used by `bindings()` implementations to bind a two-value-return
/// handler method (`fn(&mut Self, Arg) -> Result<Resp, Msg>`) per the
/// return-value convention: `Ok` serializes the response, `Err` maps through
/// the standard error code.
pub fn bind<H, A, R>(
    func_name: &'static str,
    f: impl Fn(&mut H, A) -> Result<R, String> + Send + Sync + 'static,
) -> Binding<H>
where
    H: ActorHandler,
    A: DeserializeOwned + Send + 'static,
    R: Serialize,
{
    Binding::new(
        func_name,
        Box::new(move |state, _ctx, args, _session| match decode_args::<A>(args) {
            Ok(arg) => match f(state, arg) {
                Ok(resp) => match encode_response(&resp) {
                    Ok(bytes) => InvokeOutcome::Ok(bytes),
                    Err(e) => InvokeOutcome::Err { code: crate::invocation::CODE_RPC_REMOTE_EXECUTE_ERROR, message: e.to_string() },
                },
                Err(msg) => InvokeOutcome::Err { code: crate::invocation::CODE_UNKNOWN_ERROR, message: msg },
            },
            Err(e) => InvokeOutcome::Err { code: crate::invocation::CODE_RPC_REMOTE_EXECUTE_ERROR, message: e.to_string() },
        }),
    )
}

/// Helper for a notify-style handler with no reply value at all.
pub fn bind_notify<H, A>(func_name: &'static str, f: impl Fn(&mut H, A) + Send + Sync + 'static) -> Binding<H>
where
    H: ActorHandler,
    A: DeserializeOwned + Send + 'static,
{
    Binding::new(
        func_name,
        Box::new(move |state, _ctx, args, _session| match decode_args::<A>(args) {
            Ok(arg) => {
                f(state, arg);
                InvokeOutcome::empty_ok()
            }
            Err(e) => InvokeOutcome::Err { code: crate::invocation::CODE_RPC_REMOTE_EXECUTE_ERROR, message: e.to_string() },
        }),
    )
}

/// Like [`bind_notify`] but also hands the handler the connector session,
/// if any, so it can bind a uid or inspect the connection. Cluster-originated
/// invocations always see `None`.
pub fn bind_session<H, A>(func_name: &'static str, f: impl Fn(&mut H, A, Option<&dyn SessionContext>) + Send + Sync + 'static) -> Binding<H>
where
    H: ActorHandler,
    A: DeserializeOwned + Send + 'static,
{
    Binding::new(
        func_name,
        Box::new(move |state, _ctx, args, session| match decode_args::<A>(args) {
            Ok(arg) => {
                f(state, arg, session);
                InvokeOutcome::empty_ok()
            }
            Err(e) => InvokeOutcome::Err { code: crate::invocation::CODE_RPC_REMOTE_EXECUTE_ERROR, message: e.to_string() },
        }),
    )
}
