use anyhow::Result;

fn main() -> Result<()> {
    marl_launch::cli::run()
}
