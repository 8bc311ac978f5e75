fn main() {
    kaede::start();
}
