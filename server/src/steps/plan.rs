//! The fixed install step sequence
//!
//! Step order is authoritative: every host result carries all four steps in
//! this order no matter where execution stopped, so per-host tables render
//! the same shape for every node.

/// Stable step identifiers
pub const STEP_CONFIGURE_APT_SOURCE: &str = "configure_apt_source";
pub const STEP_INSTALL_SALTSTACK_MINION: &str = "install_saltstack_minion";
pub const STEP_INSTALL_SLURM_CLIENT: &str = "install_slurm_client";
pub const STEP_FINAL_VERIFICATION: &str = "final_verification";

/// All step names in execution order
pub const STEP_ORDER: [&str; 4] = [
    STEP_CONFIGURE_APT_SOURCE,
    STEP_INSTALL_SALTSTACK_MINION,
    STEP_INSTALL_SLURM_CLIENT,
    STEP_FINAL_VERIFICATION,
];

/// What counts as success for one step
#[derive(Debug, Clone)]
pub enum SuccessPolicy {
    /// Remote command exited 0
    ExitZero,
    /// Stdout contains the marker (the command still runs under `set -e`)
    StdoutContains(&'static str),
}

/// One planned step for one host
#[derive(Debug, Clone)]
pub struct StepSpec {
    pub name: &'static str,
    pub command: String,
    pub policy: SuccessPolicy,
    /// Steps switched off by the request are carried through as skips
    pub enabled: bool,
}

/// Options shaping the install plan
#[derive(Debug, Clone)]
pub struct InstallPlanOptions {
    pub install_saltstack: bool,
    pub install_slurm: bool,
    /// Address minions use to reach the Salt master
    pub salt_master_address: String,
    /// APT repository serving SaltStack packages
    pub salt_repo_url: String,
}

/// Build the step plan for one node
pub fn install_plan(node_name: &str, options: &InstallPlanOptions) -> Vec<StepSpec> {
    let apt_source = format!(
        "set -e\n\
         install -d -m 0755 /etc/apt/keyrings\n\
         curl -fsSL {repo}/salt-archive-keyring.pgp -o /etc/apt/keyrings/salt-archive-keyring.pgp\n\
         echo 'deb [signed-by=/etc/apt/keyrings/salt-archive-keyring.pgp] {repo} stable main' \
         > /etc/apt/sources.list.d/saltstack.list\n\
         apt-get update -qq",
        repo = options.salt_repo_url
    );

    let salt_minion = format!(
        "set -e\n\
         DEBIAN_FRONTEND=noninteractive apt-get install -y -qq salt-minion\n\
         install -d /etc/salt/minion.d\n\
         printf 'master: {master}\\nid: {node}\\n' > /etc/salt/minion.d/clusterd.conf\n\
         systemctl enable salt-minion\n\
         systemctl restart salt-minion",
        master = options.salt_master_address,
        node = node_name
    );

    let slurm_client = "set -e\n\
         DEBIAN_FRONTEND=noninteractive apt-get install -y -qq slurmd slurm-client\n\
         systemctl enable slurmd"
        .to_string();

    let mut verification = String::from("set -e\n");
    if options.install_saltstack {
        verification.push_str("systemctl is-active --quiet salt-minion\n");
    }
    if options.install_slurm {
        verification.push_str("command -v slurmd >/dev/null\n");
    }
    verification.push_str("echo ready");

    vec![
        StepSpec {
            name: STEP_CONFIGURE_APT_SOURCE,
            command: apt_source,
            policy: SuccessPolicy::ExitZero,
            enabled: options.install_saltstack || options.install_slurm,
        },
        StepSpec {
            name: STEP_INSTALL_SALTSTACK_MINION,
            command: salt_minion,
            policy: SuccessPolicy::ExitZero,
            enabled: options.install_saltstack,
        },
        StepSpec {
            name: STEP_INSTALL_SLURM_CLIENT,
            command: slurm_client,
            policy: SuccessPolicy::ExitZero,
            enabled: options.install_slurm,
        },
        StepSpec {
            name: STEP_FINAL_VERIFICATION,
            command: verification,
            policy: SuccessPolicy::StdoutContains("ready"),
            enabled: options.install_saltstack || options.install_slurm,
        },
    ]
}
