//! `ABORT(message)[{ details }]`: a script-authored compile failure, used by
//! library scripts to reject unsupported host configurations outright.

use crate::error::CompileError;
use crate::module::{ModuleContext, ModuleOutcome, ModuleRegistry};
use crate::script::element::Req;

pub(crate) fn register(registry: &mut ModuleRegistry) {
    registry.define("ABORT", 1, 1, Req::Optional, |ctx: &mut ModuleContext<'_>| {
        let mut message = ctx.arg(0).to_string();
        if let Some(body) = ctx.body {
            let details = body.text.trim();
            if !details.is_empty() {
                message.push_str(": ");
                message.push_str(details);
            }
        }
        Err::<ModuleOutcome, _>(CompileError::Aborted {
            message,
            at: ctx.at.clone(),
        })
    });
}

#[cfg(test)]
mod tests {
    use crate::error::CompileError;
    use crate::script::ScriptCompiler;

    #[test]
    fn abort_raises_with_message_and_details() {
        let err = ScriptCompiler::new()
            .compile_text(
                "CALL:ABORT(unsupported host) { needs HALF_FLOAT targets }",
                "test",
            )
            .unwrap_err();
        let CompileError::Aborted { message, at } = err else {
            panic!("expected abort, got {err}");
        };
        assert_eq!(message, "unsupported host: needs HALF_FLOAT targets");
        assert_eq!(at.line, 1);
    }

    #[test]
    fn abort_inside_conditional_only_fires_when_selected() {
        let script = r#"
FORMAT:base(16, 16, RGBA, UNSIGNED_BYTE)
CALL:IF_GREATER(base.WIDTH, 1024) {
    THEN { CALL:ABORT(too large) }
}
"#;
        ScriptCompiler::new().compile_text(script, "test").unwrap();
    }

    #[test]
    fn abort_never_runs_under_safe_call_with_unknown_name() {
        // SAFE_CALL only silences *unknown* modules; a registered ABORT still
        // fires through it.
        let err = ScriptCompiler::new()
            .compile_text("SAFE_CALL:ABORT(still fatal)", "test")
            .unwrap_err();
        assert!(matches!(err, CompileError::Aborted { .. }));
    }
}
