fn main() {
    shadow_rs::ShadowBuilder::builder()
        .build()
        .expect("generate build information");
}
