fn main() -> anyhow::Result<()> {
    gesture_capture::run()
}
