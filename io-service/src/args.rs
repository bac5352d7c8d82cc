// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! I/O service configuration, as read from device and stream arguments

use crate::MGR_LOG_TARGET;
use crate::errors::IoServiceError;
use crate::service::WaitMode;
use args::DeviceArgs;
use derive_builder::Builder;
use std::fmt::Display;
#[allow(unused)]
use tracing::{debug, error, warn};

pub const RECV_OFFLOAD: &str = "recv_offload";
pub const SEND_OFFLOAD: &str = "send_offload";
pub const RECV_OFFLOAD_WAIT_MODE: &str = "recv_offload_wait_mode";
pub const SEND_OFFLOAD_WAIT_MODE: &str = "send_offload_wait_mode";
pub const NUM_POLL_OFFLOAD_THREADS: &str = "num_poll_offload_threads";

/// Prefixes of the per-thread cpu keys, which are `<prefix><index>_cpu`.
pub const RECV_OFFLOAD_THREAD_CPU: &str = "recv_offload_thread_";
pub const SEND_OFFLOAD_THREAD_CPU: &str = "send_offload_thread_";
pub const POLL_OFFLOAD_THREAD_CPU: &str = "poll_offload_thread_";
const THREAD_CPU_SUFFIX: &str = "_cpu";

/// Configuration of the I/O services of a streamer.
#[derive(Builder, Clone, Debug, PartialEq, Eq)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct IoServiceArgs {
    /// Service receive links in an offload thread
    #[builder(default)]
    pub recv_offload: bool,

    /// Service send links in an offload thread
    #[builder(default)]
    pub send_offload: bool,

    #[builder(default)]
    pub recv_offload_wait_mode: WaitMode,

    #[builder(default)]
    pub send_offload_wait_mode: WaitMode,

    /// Number of polling offload threads shared by all the links of a device
    #[builder(default = 1)]
    pub num_poll_offload_threads: usize,

    /// Cpu of each receive offload thread, by thread index
    #[builder(default)]
    pub recv_offload_thread_cpu: Vec<Option<usize>>,

    /// Cpu of each send offload thread, by thread index
    #[builder(default)]
    pub send_offload_thread_cpu: Vec<Option<usize>>,

    /// Cpu of each polling offload thread, by thread index
    #[builder(default)]
    pub poll_offload_thread_cpu: Vec<Option<usize>>,
}

impl IoServiceArgsBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.num_poll_offload_threads == Some(0) {
            return Err(format!("{NUM_POLL_OFFLOAD_THREADS} must be at least 1"));
        }
        Ok(())
    }
}

impl Default for IoServiceArgs {
    fn default() -> Self {
        Self {
            recv_offload: false,
            send_offload: false,
            recv_offload_wait_mode: WaitMode::Block,
            send_offload_wait_mode: WaitMode::Block,
            num_poll_offload_threads: 1,
            recv_offload_thread_cpu: Vec::new(),
            send_offload_thread_cpu: Vec::new(),
            poll_offload_thread_cpu: Vec::new(),
        }
    }
}

/// The cpu configured for a thread, if any.
#[must_use]
pub fn cpu_for(cpus: &[Option<usize>], thread_index: usize) -> Option<usize> {
    cpus.get(thread_index).copied().flatten()
}

/// Parse `<prefix><index>_cpu`, returning the index.
fn thread_cpu_index(key: &str, prefix: &str) -> Option<usize> {
    key.strip_prefix(prefix)?
        .strip_suffix(THREAD_CPU_SUFFIX)?
        .parse()
        .ok()
}

fn is_io_service_key(key: &str) -> bool {
    [
        RECV_OFFLOAD,
        SEND_OFFLOAD,
        RECV_OFFLOAD_WAIT_MODE,
        SEND_OFFLOAD_WAIT_MODE,
        NUM_POLL_OFFLOAD_THREADS,
    ]
    .contains(&key)
        || [
            RECV_OFFLOAD_THREAD_CPU,
            SEND_OFFLOAD_THREAD_CPU,
            POLL_OFFLOAD_THREAD_CPU,
        ]
        .iter()
        .any(|prefix| thread_cpu_index(key, prefix).is_some())
}

impl IoServiceArgs {
    /// Read the I/O service configuration from `args`. Keys that are not present keep the value
    /// they have in `defaults`.
    pub fn read(args: &DeviceArgs, defaults: &IoServiceArgs) -> Result<Self, IoServiceError> {
        let mut io_args = defaults.clone();
        if let Some(value) = args.get_bool(RECV_OFFLOAD)? {
            io_args.recv_offload = value;
        }
        if let Some(value) = args.get_bool(SEND_OFFLOAD)? {
            io_args.send_offload = value;
        }
        if let Some(mode) = args.get_parsed::<WaitMode>(RECV_OFFLOAD_WAIT_MODE)? {
            io_args.recv_offload_wait_mode = mode;
        }
        if let Some(mode) = args.get_parsed::<WaitMode>(SEND_OFFLOAD_WAIT_MODE)? {
            io_args.send_offload_wait_mode = mode;
        }
        if let Some(num) = args.get_parsed::<usize>(NUM_POLL_OFFLOAD_THREADS)? {
            if num == 0 {
                error!(target: MGR_LOG_TARGET, "Invalid {NUM_POLL_OFFLOAD_THREADS}: must be at least 1");
                return Err(IoServiceError::InvalidConfig(format!(
                    "{NUM_POLL_OFFLOAD_THREADS} must be at least 1"
                )));
            }
            io_args.num_poll_offload_threads = num;
        }

        for (key, _) in args.iter() {
            let (list, index) = if let Some(index) = thread_cpu_index(key, RECV_OFFLOAD_THREAD_CPU) {
                (&mut io_args.recv_offload_thread_cpu, index)
            } else if let Some(index) = thread_cpu_index(key, SEND_OFFLOAD_THREAD_CPU) {
                (&mut io_args.send_offload_thread_cpu, index)
            } else if let Some(index) = thread_cpu_index(key, POLL_OFFLOAD_THREAD_CPU) {
                (&mut io_args.poll_offload_thread_cpu, index)
            } else {
                continue;
            };
            let cpu = args.get_parsed::<usize>(key)?;
            if list.len() <= index {
                list.resize(index + 1, None);
            }
            list[index] = cpu;
        }
        debug!(target: MGR_LOG_TARGET, "I/O service args: {io_args}");
        Ok(io_args)
    }
}

/// The I/O service arguments of a streamer: the device arguments, with the I/O service keys of
/// the stream arguments taking precedence.
#[must_use]
pub fn merge_io_service_dev_args(device_args: &DeviceArgs, stream_args: &DeviceArgs) -> DeviceArgs {
    let overrides: DeviceArgs = stream_args
        .iter()
        .filter(|(key, _)| is_io_service_key(key))
        .collect();
    device_args.merge(&overrides)
}

impl Display for IoServiceArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fmt_cpus = |cpus: &[Option<usize>]| {
            cpus.iter()
                .map(|cpu| cpu.map_or_else(|| "-".to_string(), |cpu| cpu.to_string()))
                .collect::<Vec<_>>()
                .join(",")
        };
        write!(
            f,
            "recv offload: {} ({}), send offload: {} ({}), poll threads: {}, recv cpus: [{}], send cpus: [{}], poll cpus: [{}]",
            self.recv_offload,
            self.recv_offload_wait_mode,
            self.send_offload,
            self.send_offload_wait_mode,
            self.num_poll_offload_threads,
            fmt_cpus(&self.recv_offload_thread_cpu),
            fmt_cpus(&self.send_offload_thread_cpu),
            fmt_cpus(&self.poll_offload_thread_cpu),
        )
    }
}
