use mailq_sdk::objects::DeviceClass;

/// Coarse device class from a user agent, case-insensitively. Tablet
/// markers win over mobile ones since tablet agents usually carry both.
pub fn classify_device(user_agent: &str) -> DeviceClass {
    let ua = user_agent.to_ascii_lowercase();
    if ua.contains("tablet") || ua.contains("ipad") {
        DeviceClass::Tablet
    } else if ua.contains("mobile") || ua.contains("android") || ua.contains("iphone") {
        DeviceClass::Mobile
    } else {
        DeviceClass::Desktop
    }
}
