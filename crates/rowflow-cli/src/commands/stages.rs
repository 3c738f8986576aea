use rowflow_engine::StageRole;

/// Execute the `stages` command: list registered kinds by role.
pub fn execute() {
    let registry = super::registry();
    for role in [
        StageRole::Extractor,
        StageRole::Transformer,
        StageRole::Loader,
        StageRole::Partitioner,
    ] {
        println!("{role}s:");
        for kind in registry.kinds(role) {
            println!("  {kind}");
        }
    }
}
