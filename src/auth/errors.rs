//! Sign-in error codes and the prose shown for them.

const DIFFERENT_ACCOUNT: &str = "Try signing in with a different account.";

/// Message for an error code carried to the auth error page.
pub fn error_message(code: &str) -> &'static str {
    match code {
        "Signin" | "OAuthSignin" | "OAuthCallback" | "OAuthCreateAccount"
        | "EmailCreateAccount" | "Callback" => DIFFERENT_ACCOUNT,
        "OAuthAccountNotLinked" => {
            "To confirm your identity, sign in with the same account you used originally."
        }
        "EmailSignin" => "Check your email address.",
        "CredentialsSignin" => "Sign in failed. Check the details you provided are correct.",
        _ => "Unable to sign in.",
    }
}

/// Minimal error page for `/auth/error`.
pub fn error_page(code: &str) -> String {
    format!(
        "<!doctype html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>Authentication Error</title></head>\n\
         <body>\n<main>\n<h1>Authentication Error</h1>\n<p>{}</p>\n<a href=\"/\">Return to Home</a>\n</main>\n</body>\n</html>\n",
        error_message(code)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_and_unknown_codes() {
        assert_eq!(error_message("OAuthCallback"), DIFFERENT_ACCOUNT);
        assert_eq!(error_message("EmailSignin"), "Check your email address.");
        assert_eq!(error_message("InvalidToken"), "Unable to sign in.");
        assert!(error_page("<script>").contains("Unable to sign in."));
        assert!(!error_page("<script>").contains("<script>"));
    }
}
