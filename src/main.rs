use tabula::run_program;

fn main() {
    run_program();
}
