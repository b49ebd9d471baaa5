//! Built-in price catalog, used when the configuration lists no offerings.
//!
//! Three providers with three regions each. Regional prices are the base
//! price scaled by a per-region factor.

use spotgrid_state::{Accelerator, InstanceOffering, OfferingKey, PriceQuote};

const GIB: u64 = 1 << 30;

struct ClassSpec {
    class: &'static str,
    cpu_shares: u32,
    memory_gib: u64,
    accelerator: Option<(&'static str, u32)>,
    on_demand: f64,
    spot: f64,
}

struct ProviderSpec {
    provider: &'static str,
    regions: [(&'static str, f64); 3],
    classes: &'static [ClassSpec],
}

const CATALOG: [ProviderSpec; 3] = [
    ProviderSpec {
        provider: "aws",
        regions: [("us-east-1", 1.0), ("us-west-2", 1.0), ("eu-west-1", 1.08)],
        classes: &[
            ClassSpec { class: "m5.xlarge", cpu_shares: 4000, memory_gib: 16, accelerator: None, on_demand: 0.192, spot: 0.072 },
            ClassSpec { class: "c5.2xlarge", cpu_shares: 8000, memory_gib: 16, accelerator: None, on_demand: 0.340, spot: 0.136 },
            ClassSpec { class: "g4dn.xlarge", cpu_shares: 4000, memory_gib: 16, accelerator: Some(("nvidia-t4", 1)), on_demand: 0.526, spot: 0.210 },
        ],
    },
    ProviderSpec {
        provider: "gcp",
        regions: [("us-central1", 1.0), ("us-east1", 1.0), ("europe-west1", 1.10)],
        classes: &[
            ClassSpec { class: "n2-standard-4", cpu_shares: 4000, memory_gib: 16, accelerator: None, on_demand: 0.194, spot: 0.047 },
            ClassSpec { class: "c2-standard-8", cpu_shares: 8000, memory_gib: 32, accelerator: None, on_demand: 0.334, spot: 0.081 },
            ClassSpec { class: "n1-standard-4-t4", cpu_shares: 4000, memory_gib: 15, accelerator: Some(("nvidia-t4", 1)), on_demand: 0.540, spot: 0.180 },
        ],
    },
    ProviderSpec {
        provider: "azure",
        regions: [("eastus", 1.0), ("westus2", 1.0), ("westeurope", 1.12)],
        classes: &[
            ClassSpec { class: "Standard_D4s_v5", cpu_shares: 4000, memory_gib: 16, accelerator: None, on_demand: 0.192, spot: 0.038 },
            ClassSpec { class: "Standard_F8s_v2", cpu_shares: 8000, memory_gib: 16, accelerator: None, on_demand: 0.338, spot: 0.068 },
            ClassSpec { class: "Standard_NC4as_T4_v3", cpu_shares: 4000, memory_gib: 28, accelerator: Some(("nvidia-t4", 1)), on_demand: 0.526, spot: 0.105 },
        ],
    },
];

/// Every offering of the built-in catalog.
pub fn default_offerings() -> Vec<InstanceOffering> {
    let mut offerings = Vec::new();
    for provider in &CATALOG {
        for (region, factor) in provider.regions {
            for spec in provider.classes {
                offerings.push(InstanceOffering {
                    key: OfferingKey::new(provider.provider, region, spec.class),
                    cpu_shares: spec.cpu_shares,
                    memory_bytes: spec.memory_gib * GIB,
                    accelerator: spec.accelerator.map(|(kind, count)| Accelerator {
                        kind: kind.to_string(),
                        count,
                    }),
                    price: PriceQuote {
                        on_demand: round_cents(spec.on_demand * factor),
                        spot: Some(round_cents(spec.spot * factor)),
                        trailing_on_demand: None,
                        trailing_spot: None,
                    },
                });
            }
        }
    }
    offerings
}

/// Round to a tenth of a cent.
fn round_cents(price: f64) -> f64 {
    (price * 1000.0).round() / 1000.0
}
