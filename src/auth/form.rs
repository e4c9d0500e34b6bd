/// Username and password submitted by the login and registration forms.
///
/// The body is `application/x-www-form-urlencoded` with the fields `user`
/// and `password`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialForm {
    pub user: String,
    pub password: String,
}

impl CredentialForm {
    /// Decodes a form body. Returns `None` when either field is missing or
    /// the username is empty.
    ///
    /// # Example
    ///
    /// ```
    /// # use halfsync::auth::CredentialForm;
    /// let form = CredentialForm::parse(b"user=jin&password=s3cret%21").unwrap();
    /// assert_eq!(form.user, "jin");
    /// assert_eq!(form.password, "s3cret!");
    /// ```
    pub fn parse(body: &[u8]) -> Option<Self> {
        let mut user = None;
        let mut password = None;

        for (key, value) in url::form_urlencoded::parse(body) {
            match key.as_ref() {
                "user" => user = Some(value.into_owned()),
                "password" => password = Some(value.into_owned()),
                _ => {}
            }
        }

        let user = user.filter(|name| !name.is_empty())?;
        Some(Self {
            user,
            password: password?,
        })
    }
}
