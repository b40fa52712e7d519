//! End-to-end orchestration: RHIR optimization, STIR translation, the
//! external model-checker handshake, mutex synthesis, and C codegen — wired
//! together per the CLI's chosen encoding.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::cfir::CfirConstructor;
use crate::codegen::{analyzer::AnalyzerBackend, executable::ExecutableBackend, header, stir_exec};
use crate::codegen::codegen_module;
use crate::error::CompileResult;
use crate::mutex::{ingest_csv, MutualExclusion};
use crate::rhir::{CfOptimizer, ModuleRef, RhirContext};
use crate::stir::serialize::serialize_module;
use crate::stir::translator::RhirToStirTranslator;
use crate::subprocess::{model_check, ModelCheckPaths};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[clap(rename_all = "kebab-case")]
pub enum Encoding {
    Executable,
    Analyzer,
    AnalyzerKernel,
    Header,
    Rhir,
    Stir,
    StateSpace,
    ExecutableStir,
}

pub struct PipelineOptions<'a> {
    pub encoding: Encoding,
    pub embed_header: bool,
    pub ltsmin: Option<&'a std::path::Path>,
    pub pins_stir: Option<&'a std::path::Path>,
}

/// Runs the requested encoding to completion and returns the text to write
/// to the output file.
pub fn run(ctx: &mut RhirContext, module: ModuleRef, opts: PipelineOptions<'_>) -> CompileResult<String> {
    optimize_all_processes(ctx, module)?;

    if opts.encoding == Encoding::Rhir {
        return Ok(dump_rhir(ctx, module)?);
    }

    let (st_module, mapping) = RhirToStirTranslator::new(ctx).translate(module)?;

    match opts.encoding {
        Encoding::Rhir => unreachable!(),
        Encoding::Stir => Ok(serialize_module(&st_module)),
        Encoding::ExecutableStir => Ok(stir_exec::generate(&st_module)),
        Encoding::StateSpace => {
            let csv = run_checker(&opts, &st_module)?;
            Ok(csv)
        }
        Encoding::Executable | Encoding::Analyzer | Encoding::AnalyzerKernel | Encoding::Header => {
            let csv = run_checker(&opts, &st_module)?;
            let inclusion = ingest_csv(&csv, &mapping);
            let exclusion = MutualExclusion::new(ctx, module, &inclusion);
            let cfir = CfirConstructor::new(ctx, module, exclusion).construct()?;

            let body = match opts.encoding {
                Encoding::Executable => codegen_module(&cfir, &ExecutableBackend),
                Encoding::Analyzer => codegen_module(&cfir, &AnalyzerBackend { userspace: true }),
                Encoding::AnalyzerKernel => codegen_module(&cfir, &AnalyzerBackend { userspace: false }),
                Encoding::Header => return Ok(header::generate_header(&cfir)),
                _ => unreachable!(),
            };

            if opts.embed_header {
                let header_text = header::generate_header(&cfir);
                Ok(format!("{header_text}\n{body}"))
            } else {
                Ok(body)
            }
        }
    }
}

fn run_checker(opts: &PipelineOptions<'_>, st_module: &crate::stir::StModule) -> CompileResult<String> {
    let ltsmin = opts.ltsmin.ok_or_else(|| {
        crate::error::CompileError::Subprocess("--ltsmin not configured".to_string())
    })?;
    let pins_stir = opts.pins_stir.ok_or_else(|| {
        crate::error::CompileError::Subprocess("--pins-stir not configured".to_string())
    })?;
    let stir_text = serialize_module(st_module);
    model_check(ModelCheckPaths { ltsmin, pins_stir }, &stir_text)
}

fn optimize_all_processes(ctx: &mut RhirContext, module: ModuleRef) -> CompileResult<()> {
    let processes = ctx.get_module(module)?.processes.clone();
    let optimizer = CfOptimizer::new();
    for process in processes {
        let p = ctx.get_process(process)?.clone();
        optimizer.optimize(ctx, p.control_flow, p.entry_block)?;
    }
    Ok(())
}

fn dump_rhir(ctx: &RhirContext, module: ModuleRef) -> CompileResult<String> {
    let m = ctx.get_module(module)?;
    let mut out = String::new();
    out.push_str("module {\n");
    for &instance in &m.instances {
        let inst = ctx.get_instance(instance)?;
        out.push_str(&format!("  instance {} : {}\n", inst.label, instance));
    }
    for &process in &m.processes {
        let p = ctx.get_process(process)?;
        out.push_str(&format!(
            "  process {} entry={}\n",
            p.label, p.entry_block
        ));
    }
    out.push_str("}\n");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rhir::builder::{ModelFile, RhirBuilder};

    fn ping_pong() -> (RhirContext, ModuleRef) {
        let mut ctx = RhirContext::new();
        let model: ModelFile = serde_json::from_str(
            r#"{
                "symbols": ["ping"],
                "domains": { "pings": {"symbols": ["ping"]} },
                "protocols": {
                    "Sender": {"in": null, "out": "pings"},
                    "Receiver": {"in": "pings", "out": null}
                },
                "instances": { "s": {"protocol": "Sender"}, "r": {"protocol": "Receiver"} },
                "processes": {
                    "Sender": {
                        "protocol": "Sender", "entry_block": "b0",
                        "blocks": { "b0": {
                            "operations": [{"kind": "transmission", "destinations": ["r"], "message": "ping"}],
                            "edge": {"kind": "unconditional", "target": "b0"}
                        }}
                    },
                    "Receiver": {
                        "protocol": "Receiver", "entry_block": "b0",
                        "blocks": {
                            "b0": {
                                "operations": [],
                                "edge": {"kind": "conditional", "target": "b1", "alternative": "b0",
                                    "condition": {"kind": "receival", "messages": ["ping"]}}
                            },
                            "b1": {
                                "operations": [{"kind": "external_action", "action": "recv_ping"}],
                                "edge": {"kind": "unconditional", "target": "b0"}
                            }
                        }
                    }
                },
                "module": {"processes": ["Sender", "Receiver"], "instances": ["s", "r"]}
            }"#,
        )
        .unwrap();
        let module = RhirBuilder::build(&mut ctx, &model).unwrap();
        (ctx, module)
    }

    #[test]
    fn stir_encoding_does_not_require_external_tools() {
        let (mut ctx, module) = ping_pong();
        let text = run(
            &mut ctx,
            module,
            PipelineOptions {
                encoding: Encoding::Stir,
                embed_header: false,
                ltsmin: None,
                pins_stir: None,
            },
        )
        .unwrap();
        assert!(text.starts_with("state "));
    }

    #[test]
    fn rhir_encoding_dumps_processes_and_instances() {
        let (mut ctx, module) = ping_pong();
        let text = run(
            &mut ctx,
            module,
            PipelineOptions {
                encoding: Encoding::Rhir,
                embed_header: false,
                ltsmin: None,
                pins_stir: None,
            },
        )
        .unwrap();
        assert!(text.contains("instance s"));
        assert!(text.contains("process Sender"));
    }

    #[test]
    fn executable_encoding_without_tools_is_a_subprocess_error() {
        let (mut ctx, module) = ping_pong();
        let err = run(
            &mut ctx,
            module,
            PipelineOptions {
                encoding: Encoding::Executable,
                embed_header: false,
                ltsmin: None,
                pins_stir: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, crate::error::CompileError::Subprocess(_)));
    }
}
