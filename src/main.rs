fn main() {
    studyxp_lib::run()
}
