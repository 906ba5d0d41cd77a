//! Policies command implementation

use crate::cli::output::{format_policies_json, format_policies_table, PolicyView};
use crate::cli::PoliciesArgs;
use crate::policy::PolicySet;

/// Handle `tierline policies`
pub fn handle_policies(args: &PoliciesArgs, policies: &PolicySet) -> anyhow::Result<String> {
    let views: Vec<PolicyView> = policies
        .policies()
        .map(|policy| {
            let tasks = policies
                .assignments()
                .iter()
                .filter(|(_, name)| name.as_str() == policy.name())
                .map(|(task, _)| task.clone())
                .collect();
            PolicyView::new(policy, tasks)
        })
        .collect();

    if args.json {
        Ok(format_policies_json(&views)?)
    } else if views.is_empty() {
        Ok("No named policies configured; tasks use the default chain for their tier.".to_string())
    } else {
        Ok(format_policies_table(&views))
    }
}
