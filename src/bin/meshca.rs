extern crate meshca;

use meshca::cli::Options;

fn main() {
    if let Err(e) = Options::from_args().run() {
        eprintln!("{}", e);
        ::std::process::exit(1);
    }
}
