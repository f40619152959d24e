// SPDX-License-Identifier: Apache-2.0

//! Decodes CPUID leaf 1 into a family/model pair and resolves that pair to
//! a supported [`Microarchitecture`], mirroring the `switch (family)`
//! cascade this broker's bootstrap runs once at startup.

use hwreg_policy::Microarchitecture;
use thiserror::Error;

use crate::cpuid::CpuIdentity;

const P6_FAMILY: u32 = 6;
const K8_FAMILY: u32 = 15;
const K10_FAMILY: u32 = 16;
const K15_FAMILY: u32 = 21;
const K16_FAMILY: u32 = 22;

const SANDYBRIDGE: u32 = 0x2A;
const SANDYBRIDGE_EP: u32 = 0x2D;
const IVYBRIDGE: u32 = 0x3A;
const IVYBRIDGE_EP: u32 = 0x3E;
const HASWELL: u32 = 0x3C;
const HASWELL_M1: u32 = 0x45;
const HASWELL_M2: u32 = 0x46;
const HASWELL_EP: u32 = 0x3F;
const BROADWELL: u32 = 0x3D;
const BROADWELL_D: u32 = 0x56;
const BROADWELL_E: u32 = 0x4F;
const SKYLAKE1: u32 = 0x4E;
const SKYLAKE2: u32 = 0x5E;
const KABYLAKE1: u32 = 0x8E;
const KABYLAKE2: u32 = 0x9E;
const ATOM_SILVERMONT_C: u32 = 0x4D;
const ATOM_SILVERMONT_E: u32 = 0x37;
const ATOM_SILVERMONT_Z1: u32 = 0x4A;
const ATOM_SILVERMONT_Z2: u32 = 0x5A;
const ATOM_SILVERMONT_F: u32 = 0x4C;
const ATOM_SILVERMONT_AIR: u32 = 0x75;
const XEON_PHI_KNL: u32 = 0x57;

/// The host reported a `(family, model)` pair this broker has no allow-list
/// for.
///
/// Per the bootstrap contract this is always fatal: the service process
/// must not start its dispatcher loop without a resolved policy.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported processor: family {family:#x} model {model:#x}")]
pub struct UnsupportedProcessor {
    /// The decoded CPUID family.
    pub family: u32,
    /// The decoded CPUID model.
    pub model: u32,
}

/// The microarchitecture and PMC-counter width decoded from CPUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostIdentity {
    /// The resolved microarchitecture, used to select MSR/PCI policy.
    pub microarch: Microarchitecture,
    /// Number of general-purpose performance counters the host reports
    /// (CPUID leaf `0x0A`, `eax` bits `15:8`). Only the base `intel` policy
    /// tier consults this.
    pub num_pmc_counters: u32,
}

/// Reads CPUID leaves 1 and `0x0A` from `cpu` and resolves the host's
/// identity.
///
/// # Errors
///
/// Returns [`UnsupportedProcessor`] if the `(family, model)` pair decoded
/// from leaf 1 has no known allow-list.
pub fn identify(cpu: &dyn CpuIdentity) -> Result<HostIdentity, UnsupportedProcessor> {
    let leaf1 = cpu.cpuid(0x01, 0x00);
    let family = ((leaf1.eax >> 8) & 0xF) + ((leaf1.eax >> 20) & 0xFF);
    let model = ((leaf1.eax >> 16) & 0xF) << 4 | ((leaf1.eax >> 4) & 0xF);

    let leaf_a = cpu.cpuid(0x0A, 0x00);
    let num_pmc_counters = (leaf_a.eax >> 8) & 0xFF;

    let microarch = resolve(family, model).ok_or(UnsupportedProcessor { family, model })?;

    Ok(HostIdentity {
        microarch,
        num_pmc_counters,
    })
}

fn resolve(family: u32, model: u32) -> Option<Microarchitecture> {
    use Microarchitecture as M;
    match family {
        P6_FAMILY => Some(match model {
            SANDYBRIDGE | IVYBRIDGE => M::SandyIvyClient,
            SANDYBRIDGE_EP | IVYBRIDGE_EP => M::SandyIvyEp,
            HASWELL | HASWELL_M1 | HASWELL_M2 | BROADWELL | SKYLAKE1 | SKYLAKE2 | KABYLAKE1
            | KABYLAKE2 => M::HaswellBroadwellSkylakeKabyClient,
            BROADWELL_D | HASWELL_EP | BROADWELL_E => M::BroadwellDHaswellEpBroadwellE,
            ATOM_SILVERMONT_C | ATOM_SILVERMONT_E | ATOM_SILVERMONT_Z1 | ATOM_SILVERMONT_Z2
            | ATOM_SILVERMONT_F | ATOM_SILVERMONT_AIR => M::SilvermontFamily,
            XEON_PHI_KNL => M::XeonPhiKnl,
            _ => return None,
        }),
        K8_FAMILY | K10_FAMILY => Some(M::AmdFamily10),
        K15_FAMILY => Some(M::AmdFamily15),
        K16_FAMILY => Some(M::AmdFamily16),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpuid::{CpuidResult, FixedCpuId};

    fn leaf1_for(family: u32, model: u32) -> CpuidResult {
        let base_family = if family <= 0xF { family } else { 0xF };
        let ext_family = family - base_family;
        let base_model = model & 0xF;
        let ext_model = (model >> 4) & 0xF;
        let eax = (base_family << 8) | (ext_family << 20) | (ext_model << 16) | (base_model << 4);
        CpuidResult {
            eax,
            ..Default::default()
        }
    }

    #[test]
    fn sandybridge_ep_selects_the_ep_microarch() {
        let cpu = FixedCpuId::new().with_leaf(0x01, 0x00, leaf1_for(P6_FAMILY, SANDYBRIDGE_EP));
        let id = identify(&cpu).unwrap();
        assert_eq!(id.microarch, Microarchitecture::SandyIvyEp);
    }

    #[test]
    fn haswell_ep_resolves_to_the_broadwell_d_group() {
        let cpu = FixedCpuId::new().with_leaf(0x01, 0x00, leaf1_for(P6_FAMILY, HASWELL_EP));
        let id = identify(&cpu).unwrap();
        assert_eq!(id.microarch, Microarchitecture::BroadwellDHaswellEpBroadwellE);
    }

    #[test]
    fn amd_family_0x15_resolves_correctly() {
        let cpu = FixedCpuId::new().with_leaf(0x01, 0x00, leaf1_for(K15_FAMILY, 0));
        let id = identify(&cpu).unwrap();
        assert_eq!(id.microarch, Microarchitecture::AmdFamily15);
    }

    #[test]
    fn unknown_family_is_rejected() {
        let cpu = FixedCpuId::new().with_leaf(0x01, 0x00, leaf1_for(0x99, 0));
        assert!(identify(&cpu).is_err());
    }

    #[test]
    fn num_pmc_counters_reads_leaf_0x0a_bits_15_8() {
        let cpu = FixedCpuId::new()
            .with_leaf(0x01, 0x00, leaf1_for(P6_FAMILY, SANDYBRIDGE))
            .with_leaf(
                0x0A,
                0x00,
                CpuidResult {
                    eax: 8 << 8,
                    ..Default::default()
                },
            );
        let id = identify(&cpu).unwrap();
        assert_eq!(id.num_pmc_counters, 8);
    }
}
