// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Execution profile tag passed to [`crate::configure`].
//!
//! `msquic` takes this as an enum value handed straight to
//! `QuicRegistrationOpen`. There is no equivalent registration concept in
//! `quinn`/Tokio, so the profile instead shapes the crate-owned Tokio
//! runtime that drives every connection's background tasks.

use std::num::NonZeroUsize;

/// Abstract execution-profile tag for the process-wide registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionProfile {
    /// Minimize handshake and send/receive latency at the cost of some throughput.
    #[default]
    LowLatency,
    /// Yield aggressively to other work on the host; suitable for background clients.
    Scavenger,
    /// Favor aggregate throughput over any single connection's latency.
    MaxThroughput,
    /// Minimize scheduling jitter; closest real-time behavior the platform allows.
    RealTime,
}

impl ExecutionProfile {
    /// Number of worker threads to give the runtime for this profile.
    ///
    /// `Scavenger` gets a single worker so it never competes for more than one
    /// core; the others get a small fixed pool sized well below
    /// `std::thread::available_parallelism` so a client library never
    /// monopolizes the host.
    pub(crate) fn worker_threads(self) -> NonZeroUsize {
        let n = match self {
            ExecutionProfile::Scavenger => 1,
            ExecutionProfile::LowLatency | ExecutionProfile::RealTime => 2,
            ExecutionProfile::MaxThroughput => 4,
        };
        NonZeroUsize::new(n).expect("profile thread counts are all nonzero")
    }

    /// Thread name prefix used for the runtime's worker threads, useful when
    /// reading a thread dump from a process embedding this crate.
    pub(crate) fn thread_name_prefix(self) -> &'static str {
        match self {
            ExecutionProfile::LowLatency => "mqtt-quic-ll",
            ExecutionProfile::Scavenger => "mqtt-quic-scavenger",
            ExecutionProfile::MaxThroughput => "mqtt-quic-throughput",
            ExecutionProfile::RealTime => "mqtt-quic-rt",
        }
    }
}

impl std::str::FromStr for ExecutionProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low_latency" => Ok(ExecutionProfile::LowLatency),
            "scavenger" => Ok(ExecutionProfile::Scavenger),
            "max_throughput" => Ok(ExecutionProfile::MaxThroughput),
            "real_time" => Ok(ExecutionProfile::RealTime),
            other => Err(format!("unrecognized execution profile: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("low_latency", ExecutionProfile::LowLatency; "low_latency")]
    #[test_case("scavenger", ExecutionProfile::Scavenger; "scavenger")]
    #[test_case("max_throughput", ExecutionProfile::MaxThroughput; "max_throughput")]
    #[test_case("real_time", ExecutionProfile::RealTime; "real_time")]
    fn parses_each_known_profile_tag(tag: &str, expected: ExecutionProfile) {
        assert_eq!(tag.parse::<ExecutionProfile>().unwrap(), expected);
    }

    #[test]
    fn parses_known_profiles() {
        assert_eq!(
            "low_latency".parse::<ExecutionProfile>().unwrap(),
            ExecutionProfile::LowLatency
        );
        assert_eq!(
            "real_time".parse::<ExecutionProfile>().unwrap(),
            ExecutionProfile::RealTime
        );
    }

    #[test]
    fn rejects_unknown_profile() {
        assert!("turbo".parse::<ExecutionProfile>().is_err());
    }

    #[test]
    fn scavenger_gets_a_single_worker() {
        assert_eq!(ExecutionProfile::Scavenger.worker_threads().get(), 1);
    }
}
