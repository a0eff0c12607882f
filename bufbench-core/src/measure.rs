//! Measurement Timing
//!
//! Wall-clock timing via `std::time::Instant` plus hardware cycle counters
//! (RDTSCP on x86_64, CNTVCT_EL0 on AArch64) where the platform has them.
//! Cycle counts are reported as 0 elsewhere.

/// Read the CPU cycle/tick counter (platform-specific).
#[cfg(target_arch = "x86_64")]
#[inline(always)]
fn read_cycles() -> u64 {
    // SAFETY: RDTSCP is available on all x86_64 CPUs since ~2006 and waits
    // for prior instructions to retire before sampling the counter.
    unsafe {
        let mut _aux: u32 = 0;
        std::arch::x86_64::__rdtscp(&mut _aux)
    }
}

/// Read the virtual counter timer on AArch64 (comparable to x86 TSC).
#[cfg(target_arch = "aarch64")]
#[inline(always)]
fn read_cycles() -> u64 {
    let cnt: u64;
    // SAFETY: CNTVCT_EL0 is readable from EL0 on all AArch64 implementations
    // and increases monotonically at a fixed frequency.
    unsafe {
        std::arch::asm!("mrs {}, cntvct_el0", out(reg) cnt, options(nostack, nomem));
    }
    cnt
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
#[inline(always)]
fn read_cycles() -> u64 {
    0
}

/// Whether this platform provides real cycle counters.
pub const HAS_CYCLE_COUNTER: bool = cfg!(target_arch = "x86_64") || cfg!(target_arch = "aarch64");

/// Timer spanning one measured invocation (one batch of reads).
pub struct Timer {
    start: std::time::Instant,
    cycles_start: u64,
}

impl Timer {
    /// Start timing.
    #[inline(always)]
    pub fn start() -> Self {
        Self {
            cycles_start: read_cycles(),
            start: std::time::Instant::now(),
        }
    }

    /// Stop and return (elapsed nanoseconds, elapsed cycles).
    #[inline(always)]
    pub fn stop(&self) -> (u64, u64) {
        let nanos = self.start.elapsed().as_nanos() as u64;
        let cycles = read_cycles().saturating_sub(self.cycles_start);
        (nanos, cycles)
    }
}

/// Consume a benchmark result so the compiler cannot prove it unused.
///
/// The only contract of this sink is preventing dead-code elimination of the
/// read that produced `value`. Whether it also defeats hoisting or constant
/// folding of a loop-invariant load is target-dependent; verify empirically
/// when adding a new backing.
#[inline(always)]
pub fn sink<T>(value: T) -> T {
    std::hint::black_box(value)
}
