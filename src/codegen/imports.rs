//! Fixed import block and runtime prelude shared by every generated workflow.
//!
//! Both are emitted verbatim so the output depends only on the pipeline.

use super::writer::CodeWriter;

const CRE_IMPORTS: &[&str] = &[
    "bytesToHex",
    "consensusIdenticalAggregation",
    "cre",
    "encodeCallMsg",
    "getNetwork",
    "hexToBase64",
    "LAST_FINALIZED_BLOCK_NUMBER",
    "ok",
    "Runner",
    "type CronPayload",
    "type EVMLog",
    "type HTTPPayload",
    "type HTTPSendRequester",
    "type Runtime",
];

const VIEM_IMPORTS: &[&str] = &[
    "decodeFunctionResult",
    "encodeFunctionData",
    "keccak256",
    "parseAbi",
    "toHex",
    "zeroAddress",
    "type Abi",
    "type Address",
];

pub fn emit_imports(w: &mut CodeWriter) {
    emit_import(w, CRE_IMPORTS, "@chainlink/cre-sdk");
    emit_import(w, VIEM_IMPORTS, "viem");
}

fn emit_import(w: &mut CodeWriter, names: &[&str], package: &str) {
    w.line("import {");
    w.indent();
    for name in names {
        w.line(&format!("{},", name));
    }
    w.dedent();
    w.line(&format!("}} from \"{}\";", package));
}

/// Helpers referenced by emitter output.
const PRELUDE: &[&str] = &[
    "const __stringify = (v: unknown): string =>",
    "  JSON.stringify(v, (_, x) => (typeof x === \"bigint\" ? x.toString() : x));",
    "",
    "const __parse = (v: unknown): any => (typeof v === \"string\" ? JSON.parse(v) : v);",
    "",
    "const __unresolved = (what: string): never => {",
    "  throw new Error(`unresolved binding: ${what}`);",
    "};",
    "",
    "const __evmClient = (chainSelectorName: string, isTestnet: boolean) => {",
    "  const network = getNetwork({ chainFamily: \"evm\", chainSelectorName, isTestnet });",
    "  if (!network) {",
    "    throw new Error(`network not found: ${chainSelectorName}`);",
    "  }",
    "  return new cre.capabilities.EVMClient(network.chainSelector.selector);",
    "};",
    "",
    "type __Request = { url: string; method: string; headers?: Record<string, string>; body?: unknown; timeoutMs?: number };",
    "",
    "const __httpJson = (runtime: Runtime<Config>, request: __Request) => {",
    "  const fetcher = (sendRequester: HTTPSendRequester, r: __Request) => {",
    "    const resp = sendRequester",
    "      .sendRequest({",
    "        url: r.url,",
    "        method: r.method,",
    "        headers: r.headers ?? {},",
    "        body: r.body === undefined ? undefined : Buffer.from(__stringify(r.body)).toString(\"base64\"),",
    "        timeoutMs: r.timeoutMs,",
    "      })",
    "      .result();",
    "    if (!ok(resp)) {",
    "      throw new Error(`HTTP ${resp.statusCode} from ${r.url}`);",
    "    }",
    "    return { status: resp.statusCode, body: __parse(new TextDecoder().decode(resp.body)) };",
    "  };",
    "  return new cre.capabilities.HTTPClient()",
    "    .sendRequest(runtime, fetcher, consensusIdenticalAggregation())(request)",
    "    .result();",
    "};",
    "",
    "const __evmRead = (",
    "  runtime: Runtime<Config>,",
    "  client: any,",
    "  address: Address,",
    "  functionName: string,",
    "  abi: Abi,",
    "  args: readonly unknown[],",
    "): any => {",
    "  const data = encodeFunctionData({ abi, functionName, args });",
    "  const reply = client",
    "    .callContract(runtime, {",
    "      call: encodeCallMsg({ from: zeroAddress, to: address, data }),",
    "      blockNumber: LAST_FINALIZED_BLOCK_NUMBER,",
    "    })",
    "    .result();",
    "  return decodeFunctionResult({ abi, functionName, data: bytesToHex(reply.data) });",
    "};",
    "",
    "const __evmWrite = (",
    "  runtime: Runtime<Config>,",
    "  client: any,",
    "  receiver: Address,",
    "  gasLimit: bigint,",
    "  payload: unknown,",
    "): string => {",
    "  const report = runtime",
    "    .report({",
    "      encodedPayload: hexToBase64(toHex(__stringify(payload))),",
    "      encoderName: \"evm\",",
    "      signingAlgo: \"ecdsa\",",
    "      hashingAlgo: \"keccak256\",",
    "    })",
    "    .result();",
    "  const resp = client",
    "    .writeReport(runtime, { receiver, report, gasConfig: { gasLimit: gasLimit.toString() } })",
    "    .result();",
    "  return bytesToHex(resp.txHash ?? new Uint8Array(32));",
    "};",
];

pub fn emit_prelude(w: &mut CodeWriter) {
    for line in PRELUDE {
        if line.is_empty() {
            w.blank();
        } else {
            w.line(line);
        }
    }
}
