//! Daemon mode implementation for long-lived mount handling.
//!
//! Reads newline-delimited JSON requests from stdin, executes them against a
//! single [`MounterRegistry`] and writes one JSON response per request to
//! stdout. Logs go to stderr so they never interleave with responses.

use std::io::{self, BufRead, Write};

use cephfs_mount_core::protocol::{DaemonCommand, DaemonRequest, DaemonResponse};
use cephfs_mount_core::{ExecutionContext, MounterRegistry, bind_mount};
use log::{debug, warn};
use serde_json::json;

/// Runs the daemon until stdin closes or a shutdown request arrives.
pub fn run_daemon(registry: &MounterRegistry, ctx: &ExecutionContext) -> io::Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    serve(registry, ctx, stdin.lock(), &mut stdout)
}

fn serve<R, W>(
    registry: &MounterRegistry,
    ctx: &ExecutionContext,
    reader: R,
    writer: &mut W,
) -> io::Result<()>
where
    R: BufRead,
    W: Write,
{
    // Track last request ID to reject stale or duplicated requests
    let mut last_id: u64 = 0;

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let request: DaemonRequest = match serde_json::from_str(&line) {
            Ok(req) => req,
            Err(e) => {
                // Can't respond without an ID
                warn!("failed to parse request: {}", e);
                continue;
            }
        };

        if request.id <= last_id {
            let response = DaemonResponse::err(
                request.id,
                format!("request ID {} <= last ID {}", request.id, last_id),
            );
            write_response(writer, &response)?;
            continue;
        }
        last_id = request.id;

        debug!("handling request {}: {:?}", request.id, request.cmd);

        if let DaemonCommand::Shutdown = request.cmd {
            write_response(writer, &DaemonResponse::ok(request.id, None))?;
            break;
        }

        let response = handle(registry, ctx, request);
        write_response(writer, &response)?;
    }

    Ok(())
}

fn handle(
    registry: &MounterRegistry,
    ctx: &ExecutionContext,
    request: DaemonRequest,
) -> DaemonResponse {
    let id = request.id;
    let result = match request.cmd {
        DaemonCommand::Mount {
            mount_point,
            credentials,
            options,
        } => registry
            .mount(ctx, &mount_point, &credentials, &options)
            .map(|kind| Some(json!({ "mounter": kind }))),
        DaemonCommand::BindMount {
            from,
            to,
            read_only,
            options,
        } => bind_mount(ctx, &from, &to, read_only, &options).map(|()| None),
        DaemonCommand::Unmount { mount_point } => registry
            .unmount(ctx, &mount_point)
            .map(|outcome| Some(json!({ "outcome": outcome }))),
        DaemonCommand::Probe => Ok(Some(json!({
            "mounters": registry.available(),
            "reports": registry.probe_reports(),
        }))),
        DaemonCommand::Shutdown => Ok(None),
    };

    match result {
        Ok(detail) => DaemonResponse::ok(id, detail),
        Err(e) => DaemonResponse::err(id, e.to_string()),
    }
}

fn write_response<W: Write>(writer: &mut W, response: &DaemonResponse) -> io::Result<()> {
    let json = serde_json::to_string(response).map_err(io::Error::other)?;
    writeln!(writer, "{}", json)?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use cephfs_mount_core::{MounterConfig, MounterKind};

    use super::*;

    fn run_lines(input: &str) -> Vec<DaemonResponse> {
        let registry =
            MounterRegistry::with_available(vec![MounterKind::Fuse], MounterConfig::default())
                .unwrap();
        let ctx = ExecutionContext::default();
        let mut out = Vec::new();

        serve(&registry, &ctx, Cursor::new(input), &mut out).unwrap();

        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_reports_then_shutdown() {
        let responses = run_lines(
            "{\"id\":1,\"cmd\":\"probe\"}\n\
             {\"id\":2,\"cmd\":\"shutdown\"}\n\
             {\"id\":3,\"cmd\":\"probe\"}\n",
        );

        assert_eq!(responses.len(), 2);
        assert!(responses[0].success);
        assert_eq!(responses[1].id, 2);
    }

    #[test]
    fn test_daemon_returns_load_time_reports() {
        let responses = run_lines("{\"id\":1,\"cmd\":\"probe\"}\n");

        assert_eq!(
            responses[0].detail,
            Some(json!({
                "mounters": ["fuse"],
                "reports": [
                    { "mounter": "kernel", "status": "unavailable", "reason": "not probed" },
                    { "mounter": "fuse", "status": "available" },
                ],
            }))
        );
    }

    #[test]
    fn test_rejects_stale_ids_and_skips_garbage() {
        let responses = run_lines(
            "not json\n\
             {\"id\":5,\"cmd\":\"probe\"}\n\
             {\"id\":5,\"cmd\":\"probe\"}\n",
        );

        assert_eq!(responses.len(), 2);
        assert!(responses[0].success);
        assert!(!responses[1].success);
        assert!(responses[1].error.as_deref().unwrap().contains("last ID 5"));
    }
}
