//! Templates command - prints the built-in return workflow templates

use clap::Args;

use crate::domain::workflow::{TemplateRegistry, WorkflowTemplate};

#[derive(Debug, Args)]
pub struct TemplatesArgs {
    /// Print as JSON instead of a plain listing
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: TemplatesArgs) -> anyhow::Result<()> {
    let registry = TemplateRegistry::builtin();

    if args.json {
        println!("{}", serde_json::to_string_pretty(registry.list())?);
    } else {
        for template in registry.list() {
            println!("{}", render(template));
        }
    }

    Ok(())
}

fn render(template: &WorkflowTemplate) -> String {
    format!(
        "{} ({}): {}",
        template.id(),
        template.name(),
        template.step_names().join(" -> ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_lists_steps_in_order() {
        let registry = TemplateRegistry::builtin();
        let quick = registry.get("quick_return").unwrap();

        assert_eq!(
            render(quick),
            "quick_return (Quick Return): submitted -> refund_processed -> completed"
        );
    }
}
