use colored::Colorize;

fn main() {
    if let Err(e) = learnstate::run() {
        eprintln!("{} [{}] {}", "error:".red().bold(), e.kind(), e);
        std::process::exit(1);
    }
}
