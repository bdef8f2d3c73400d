use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    fetal_net::cli()
}
