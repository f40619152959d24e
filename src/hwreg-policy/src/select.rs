// SPDX-License-Identifier: Apache-2.0

//! Maps a host's identified microarchitecture to the pair of allow-list
//! predicates that govern every request on that host for the lifetime of
//! the process.

use crate::{
    amd, intel, pci, MsrPolicyFn, PciPolicyFn,
};

/// A microarchitecture family this broker knows an allow-list for.
///
/// Produced by CPU identification at bootstrap; never reconsidered once a
/// process has started, since the policy a process enforces must stay
/// constant for the life of the connections it serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Microarchitecture {
    /// Generic P6-derived client part with no further-specialized policy.
    IntelGeneric,
    /// Sandy Bridge / Ivy Bridge client.
    SandyIvyClient,
    /// Sandy Bridge-EP / Ivy Bridge-EP.
    SandyIvyEp,
    /// Haswell, Broadwell, Skylake, or Kaby Lake client parts.
    HaswellBroadwellSkylakeKabyClient,
    /// Broadwell-D, Haswell-EP, or Broadwell-E.
    BroadwellDHaswellEpBroadwellE,
    /// Silvermont-family (Atom) parts.
    SilvermontFamily,
    /// Xeon Phi Knights Landing.
    XeonPhiKnl,
    /// AMD family 0x10 and earlier.
    AmdFamily10,
    /// AMD family 0x15.
    AmdFamily15,
    /// AMD family 0x16.
    AmdFamily16,
}

/// Resolves the MSR policy, and (when the microarchitecture has an uncore
/// that lives in PCI configuration space) the PCI policy, for `microarch`.
#[must_use]
pub fn select(microarch: Microarchitecture) -> (MsrPolicyFn, Option<PciPolicyFn>) {
    use Microarchitecture as M;
    match microarch {
        M::IntelGeneric => (intel::allowed_intel, None),
        M::SandyIvyClient | M::HaswellBroadwellSkylakeKabyClient => {
            (intel::allowed_sandybridge, None)
        }
        M::SandyIvyEp => (
            intel::allowed_sandybridge,
            Some(pci::allowed_pci_sandybridge as PciPolicyFn),
        ),
        M::BroadwellDHaswellEpBroadwellE => (
            intel::allowed_sandybridge,
            Some(pci::allowed_pci_haswell as PciPolicyFn),
        ),
        M::SilvermontFamily => (intel::allowed_silvermont, None),
        M::XeonPhiKnl => (intel::allowed_knl, Some(pci::allowed_pci_knl as PciPolicyFn)),
        M::AmdFamily10 => (amd::allowed_amd, None),
        M::AmdFamily15 => (amd::allowed_amd15, None),
        M::AmdFamily16 => (amd::allowed_amd16, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sandy_ivy_ep_carries_a_pci_policy() {
        let (_, pci_policy) = select(Microarchitecture::SandyIvyEp);
        assert!(pci_policy.is_some());
    }

    #[test]
    fn client_parts_carry_no_pci_policy() {
        let (_, pci_policy) = select(Microarchitecture::SandyIvyClient);
        assert!(pci_policy.is_none());
    }

    #[test]
    fn haswell_ep_family_uses_sandybridge_msr_policy_not_haswell() {
        // Matches the source daemon's own (perhaps surprising) choice: the
        // "haswell" MSR predicate is never actually selected by any model
        // group, including the Haswell-EP row itself.
        let (msr_policy, pci_policy) = select(Microarchitecture::BroadwellDHaswellEpBroadwellE);
        assert_eq!(msr_policy as usize, intel::allowed_sandybridge as usize);
        assert_eq!(
            pci_policy.unwrap() as usize,
            pci::allowed_pci_haswell as usize
        );
    }

    #[test]
    fn knl_pairs_the_knl_msr_and_pci_policies() {
        let (msr_policy, pci_policy) = select(Microarchitecture::XeonPhiKnl);
        assert_eq!(msr_policy as usize, intel::allowed_knl as usize);
        assert_eq!(pci_policy.unwrap() as usize, pci::allowed_pci_knl as usize);
    }

    #[test]
    fn amd_families_select_their_own_tier() {
        let (f10, _) = select(Microarchitecture::AmdFamily10);
        let (f15, _) = select(Microarchitecture::AmdFamily15);
        let (f16, _) = select(Microarchitecture::AmdFamily16);
        assert_eq!(f10 as usize, amd::allowed_amd as usize);
        assert_eq!(f15 as usize, amd::allowed_amd15 as usize);
        assert_eq!(f16 as usize, amd::allowed_amd16 as usize);
    }
}
