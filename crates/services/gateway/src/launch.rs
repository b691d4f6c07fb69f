//! Worker launch-argument glue
//!
//! The gateway is started with the worker's own command line appended to
//! its invocation. A `--port` flag in those args names the port clients
//! expect to reach, so it becomes the proxy's listen port, and the worker
//! itself is moved to the internal worker port.

/// Rewrite `--port` in the worker args to `worker_port`, returning the
/// original value (the proxy listen port) when present. Appends the flag
/// when the args carry none, so the worker always binds a known port.
pub fn rewrite_port_args(args: &mut Vec<String>, worker_port: u16) -> Option<u16> {
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            let listen_port = args[i + 1].parse().ok();
            args[i + 1] = worker_port.to_string();
            return listen_port;
        }
    }

    args.push("--port".to_string());
    args.push(worker_port.to_string());
    None
}
