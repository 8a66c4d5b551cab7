use anyhow::Result;

use super::Context;

pub fn run(ctx: &Context) -> Result<()> {
    let default = ctx.manager.default_volume();
    println!("{:<20} {:<10} {}", "NAME", "PROTOCOL", "DEFAULT");
    println!("{}", "-".repeat(40));
    for (name, protocol) in ctx.manager.volumes() {
        let marker = if name == default { "*" } else { "" };
        println!("{name:<20} {protocol:<10} {marker}");
    }
    Ok(())
}
