//! `log` and `preset` commands

use hyprink_core::Context;

/// Write one log line through the context's logger
pub fn log(ctx: &Context, level: &str, scope: &str, message: &str) {
    ctx.log(level, scope, message);
}

/// Write a preset log line
pub fn preset(ctx: &mut Context, name: &str, message: Option<&str>) {
    ctx.log_preset(name, message);
}
