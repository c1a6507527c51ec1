//! Trace-driven replayer and validator for `heap-alloc`: the consumer
//! spec.md §1 names as "a pure consumer of the allocator's public contract"
//! and explicitly keeps out of the core's design. Reads a trace file, replays
//! every operation against a [`Heap<SimRegion>`], checks correctness with
//! [`validator::RangeList`] (and, in debug builds, [`Heap::check`] after
//! every operation), and reports space utilization and throughput — the
//! three axes spec.md §1 names for the replayer to exercise.

mod logger;
mod trace;
mod validator;

use heap_alloc::Heap;
use heap_region::SimRegion;
use log::{error, info, warn, LevelFilter};
use std::collections::HashMap;
use std::env;
use std::process::ExitCode;
use std::time::Instant;
use trace::Op;
use validator::RangeList;

/// Default capacity of the simulated region when none is given on the
/// command line.
const DEFAULT_CAPACITY: usize = 64 * 1024 * 1024;

fn main() -> ExitCode {
    logger::init(LevelFilter::Info).expect("logger installed twice");

    let mut args = env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("usage: heap-trace <trace-file> [capacity-bytes]");
        return ExitCode::FAILURE;
    };
    let capacity = args
        .next()
        .map(|s| s.parse().expect("capacity-bytes must be a number"))
        .unwrap_or(DEFAULT_CAPACITY);

    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) => {
            eprintln!("failed to read {path}: {err}");
            return ExitCode::FAILURE;
        }
    };

    let ops = match trace::parse(&contents) {
        Ok(ops) => ops,
        Err(err) => {
            eprintln!("malformed trace: {err}");
            return ExitCode::FAILURE;
        }
    };

    match replay(&ops, capacity) {
        Ok(report) => {
            report.print();
            ExitCode::SUCCESS
        }
        Err(msg) => {
            error!("{msg}");
            ExitCode::FAILURE
        }
    }
}

struct Report {
    ops: usize,
    elapsed_secs: f64,
    peak_live_bytes: usize,
    heap_span: usize,
}

impl Report {
    fn print(&self) {
        let throughput = self.ops as f64 / self.elapsed_secs.max(f64::EPSILON);
        let utilization = if self.heap_span == 0 {
            0.0
        } else {
            self.peak_live_bytes as f64 / self.heap_span as f64 * 100.0
        };
        println!("PASS");
        println!("ops:          {}", self.ops);
        println!("elapsed:      {:.6}s", self.elapsed_secs);
        println!("throughput:   {throughput:.0} ops/s");
        println!("peak live:    {} bytes", self.peak_live_bytes);
        println!("heap span:    {} bytes", self.heap_span);
        println!("utilization:  {utilization:.1}%");
    }
}

/// Replay `ops` against a fresh heap of `capacity` bytes, validating
/// correctness as we go. Returns the first failure as a human-readable
/// message; `original_source`'s `validator.h` treats any such failure as
/// fatal to the whole trace, and so do we.
fn replay(ops: &[Op], capacity: usize) -> Result<Report, String> {
    let mut heap: Heap<SimRegion> =
        Heap::init(SimRegion::with_capacity(capacity)).map_err(|e| e.to_string())?;
    let mut ranges = RangeList::new();
    let mut payloads: HashMap<u32, std::ptr::NonNull<u8>> = HashMap::new();
    let mut sizes: HashMap<u32, usize> = HashMap::new();
    let mut live_bytes = 0usize;
    let mut peak_live_bytes = 0usize;

    let start = Instant::now();

    for (opnum, op) in ops.iter().enumerate() {
        match *op {
            Op::Alloc { id, size } => {
                let payload = heap
                    .allocate(size)
                    .ok_or_else(|| format!("op {opnum}: allocate({size}) failed for id {id}"))?;
                ranges
                    .add(id, payload, size, 8, heap.low(), heap.high())
                    .map_err(|e| format!("op {opnum}: {e}"))?;
                if let Some(old) = payloads.insert(id, payload) {
                    warn!("op {opnum}: id {id} reused without a prior free (old payload {old:p})");
                }
                live_bytes += size;
                sizes.insert(id, size);
            }
            Op::Resize { id, size } => {
                let old = payloads
                    .remove(&id)
                    .ok_or_else(|| format!("op {opnum}: resize of unknown id {id}"))?;
                live_bytes -= sizes.remove(&id).unwrap_or(0);
                ranges.remove(id).map_err(|e| format!("op {opnum}: {e}"))?;

                if size == 0 {
                    heap.release(Some(old));
                    continue;
                }

                let new_payload = heap
                    .resize(Some(old), size)
                    .ok_or_else(|| format!("op {opnum}: resize({size}) failed for id {id}"))?;
                ranges
                    .add(id, new_payload, size, 8, heap.low(), heap.high())
                    .map_err(|e| format!("op {opnum}: {e}"))?;
                payloads.insert(id, new_payload);
                live_bytes += size;
                sizes.insert(id, size);
            }
            Op::Free { id } => {
                let payload = payloads
                    .remove(&id)
                    .ok_or_else(|| format!("op {opnum}: free of unknown id {id}"))?;
                live_bytes -= sizes.remove(&id).unwrap_or(0);
                ranges.remove(id).map_err(|e| format!("op {opnum}: {e}"))?;
                heap.release(Some(payload));
            }
        }

        peak_live_bytes = peak_live_bytes.max(live_bytes);

        #[cfg(debug_assertions)]
        heap.check()
            .map_err(|e| format!("op {opnum}: invariant violated: {e}"))?;
    }

    let elapsed_secs = start.elapsed().as_secs_f64();
    let heap_span = heap.high().as_ptr() as usize - heap.low().as_ptr() as usize;
    info!("replayed {} ops over {:?}", ops.len(), heap_span);

    Ok(Report {
        ops: ops.len(),
        elapsed_secs,
        peak_live_bytes,
        heap_span,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_a_simple_alloc_free_trace() {
        let ops = trace::parse("a 0 64\na 1 128\nf 0\na 2 32\nf 1\nf 2\n").unwrap();
        let report = replay(&ops, 1 << 20).unwrap();
        assert_eq!(report.ops, 6);
    }

    #[test]
    fn catches_a_double_free_as_an_unknown_id() {
        let ops = trace::parse("a 0 64\nf 0\nf 0\n").unwrap();
        let err = replay(&ops, 1 << 20).unwrap_err();
        assert!(err.contains("unknown id"));
    }

    #[test]
    fn resize_updates_the_tracked_range() {
        let ops = trace::parse("a 0 64\nr 0 512\nf 0\n").unwrap();
        let report = replay(&ops, 1 << 20).unwrap();
        assert_eq!(report.ops, 3);
    }

    #[test]
    fn reports_out_of_memory_as_a_failure() {
        let ops = trace::parse("a 0 1000000\n").unwrap();
        let err = replay(&ops, 4096).unwrap_err();
        assert!(err.contains("failed"));
    }
}
