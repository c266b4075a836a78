use hl_server::auth::jwt;
use uuid::Uuid;

fn main() {
    let user_id = std::env::args()
        .nth(1)
        .expect("Usage: issue_token <user-uuid> [expiry-seconds]");
    let user_id: Uuid = user_id.parse().expect("user id must be a UUID");
    let expiry: i64 = std::env::args()
        .nth(2)
        .map_or(900, |arg| arg.parse().expect("expiry must be in seconds"));
    let secret = std::env::var("JWT_SECRET").expect("JWT_SECRET must be set");

    let token = jwt::issue_access_token(user_id, &secret, expiry).expect("Failed to issue token");
    println!("{}", token);
}
