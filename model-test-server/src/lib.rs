pub mod server;

pub use server::{
    router, run_with_args, spawn, CliArgs, RecordedRequest, ScriptedReply, SharedState,
    DEFAULT_HOST, DEFAULT_PORT,
};
