use anyhow::Result;

fn main() -> Result<()> {
    tardis::cli::run()
}
