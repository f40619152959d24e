// SPDX-License-Identifier: Apache-2.0

//! The CPUID-equivalent primitive, behind a narrow trait so bootstrap logic
//! can be exercised against a fixed, injected value on any host
//! architecture (including in CI on non-x86_64 runners).

/// The four general-purpose registers CPUID returns for a given leaf/subleaf.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuidResult {
    /// `%eax` on return.
    pub eax: u32,
    /// `%ebx` on return.
    pub ebx: u32,
    /// `%ecx` on return.
    pub ecx: u32,
    /// `%edx` on return.
    pub edx: u32,
}

/// A source of CPUID leaves.
pub trait CpuIdentity {
    /// Executes `CPUID` for `leaf`/`subleaf` and returns the result.
    fn cpuid(&self, leaf: u32, subleaf: u32) -> CpuidResult;
}

/// Reads CPUID straight from the host processor.
#[cfg(target_arch = "x86_64")]
#[derive(Debug, Clone, Copy, Default)]
pub struct HostCpuId;

#[cfg(target_arch = "x86_64")]
impl CpuIdentity for HostCpuId {
    fn cpuid(&self, leaf: u32, subleaf: u32) -> CpuidResult {
        // SAFETY: `__cpuid_count` is always defined on x86_64 and has no
        // preconditions beyond the target feature, which is implied by
        // compiling for this architecture at all.
        let raw = unsafe { core::arch::x86_64::__cpuid_count(leaf, subleaf) };
        CpuidResult {
            eax: raw.eax,
            ebx: raw.ebx,
            ecx: raw.ecx,
            edx: raw.edx,
        }
    }
}

/// A fixed CPUID response, for tests and non-x86_64 builds.
#[derive(Debug, Clone, Default)]
pub struct FixedCpuId {
    leaves: std::collections::HashMap<(u32, u32), CpuidResult>,
}

impl FixedCpuId {
    /// An empty fixture; every leaf reads back as all-zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the response for a given leaf/subleaf pair.
    #[must_use]
    pub fn with_leaf(mut self, leaf: u32, subleaf: u32, result: CpuidResult) -> Self {
        self.leaves.insert((leaf, subleaf), result);
        self
    }
}

impl CpuIdentity for FixedCpuId {
    fn cpuid(&self, leaf: u32, subleaf: u32) -> CpuidResult {
        self.leaves
            .get(&(leaf, subleaf))
            .copied()
            .unwrap_or_default()
    }
}
