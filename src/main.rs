use std::process;

fn main() {
    process::exit(quill::cli::run());
}
