fn main() {
    smartlib::run()
}
