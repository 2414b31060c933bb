//! Prints the Module and ModuleAction CRDs as YAML
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/modules.yaml
//! ```

use anyhow::Result;
use kube::CustomResourceExt;
use module_operator::crd::{Module, ModuleAction};

fn main() -> Result<()> {
    print!("{}", serde_yaml::to_string(&Module::crd())?);
    println!("---");
    print!("{}", serde_yaml::to_string(&ModuleAction::crd())?);
    Ok(())
}
