//! Emit `initWorkflow` and the `main()` entry point.

use super::handler::EmittedHandler;
use super::writer::CodeWriter;

/// Emit `initWorkflow` registering every handler, followed by `main()`.
pub fn emit_init_and_main(handlers: &[EmittedHandler], w: &mut CodeWriter) {
    emit_init_workflow(handlers, w);
    w.blank();
    emit_main(w);
}

fn emit_init_workflow(handlers: &[EmittedHandler], w: &mut CodeWriter) {
    w.block_open("const initWorkflow = (config: Config) =>");
    w.line("return [");
    w.indent();
    for handler in handlers {
        w.line("cre.handler(");
        w.indent();
        w.line(&format!("{},", handler.hook.capability));
        w.line(&format!("{},", handler.name));
        w.dedent();
        w.line("),");
    }
    w.dedent();
    w.line("];");
    w.block_close_semi();
}

fn emit_main(w: &mut CodeWriter) {
    w.block_open("export async function main()");
    w.line("const runner = await Runner.newRunner<Config>();");
    w.line("await runner.run(initWorkflow);");
    w.block_close();
    w.blank();
    w.line("main();");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::registry::TriggerHook;

    #[test]
    fn registers_handlers_in_order() {
        let handlers = vec![
            EmittedHandler {
                name: "on_a".into(),
                hook: TriggerHook {
                    capability: "capA".into(),
                    payload_type: "CronPayload".into(),
                },
            },
            EmittedHandler {
                name: "on_b".into(),
                hook: TriggerHook {
                    capability: "capB".into(),
                    payload_type: "HTTPPayload".into(),
                },
            },
        ];
        let mut w = CodeWriter::new();
        emit_init_workflow(&handlers, &mut w);
        insta::assert_snapshot!(w.finish(), @r"
        const initWorkflow = (config: Config) => {
          return [
            cre.handler(
              capA,
              on_a,
            ),
            cre.handler(
              capB,
              on_b,
            ),
          ];
        };
        ");
    }
}
