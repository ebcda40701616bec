use anyhow::{anyhow, bail, Context};
use anyhow::Result;
use log::info;
use reqwest::blocking::Client;
use scraper::{Html, Selector};
use crate::utils::grades::RowSource;

const CAS_LOGIN_URL: &str = "https://casiut21.u-bourgogne.fr/cas-iut/login";
const OGE_HOST: &str = "iutdijon.u-bourgogne.fr";
const OGE_SERVICE: &str = "https://iutdijon.u-bourgogne.fr/oge/";
pub(crate) const GRADES_URL: &str = "https://iutdijon.u-bourgogne.fr/oge/stylesheets/etu/bilansEtu.faces";
pub(crate) const SCHEDULE_URL: &str = "https://iutdijon.u-bourgogne.fr/oge/stylesheets/etu/planningEtu.faces";

// An authenticated OGE session. The cookie store carries the CAS ticket and
// the JSF session across every later request.
pub struct Session {
    client: Client,
}

impl Session {
    // Logs into OGE through CAS and returns the authenticated session.
    pub fn login(username: &str, password: &str) -> Result<Session> {
        let client = Client::builder()
            .cookie_store(true)
            .build()
            .context("Failed to build the client")?;

        // CAS only accepts credentials alongside the one-shot execution token
        // rendered into its login form, so fetch the form first.
        let form_page = client.get(CAS_LOGIN_URL)
            .query(&[("service", OGE_SERVICE)])
            .send()
            .context("Failed to request the login form")?
            .text()
            .context("Failed to read the login form")?;

        let document = Html::parse_document(&form_page);
        let execution_selector = Selector::parse("input[name=\"execution\"]").unwrap();
        let execution = document.select(&execution_selector)
            .next()
            .and_then(|input| input.value().attr("value"))
            .ok_or_else(|| anyhow!("Login form is missing its execution token"))?
            .to_string();

        let response = client.post(CAS_LOGIN_URL)
            .query(&[("service", OGE_SERVICE)])
            .form(&[
                ("username", username),
                ("password", password),
                ("execution", execution.as_str()),
                ("_eventId", "submit"),
            ])
            .send()
            .context("Failed to send login request")?;

        // A rejected login answers 200 and re-renders the CAS form; a granted
        // one redirects back to the portal.
        if response.url().host_str() != Some(OGE_HOST) {
            bail!("Authentication Failed, check your credentials and try again.");
        }
        info!("Authenticated on {}", OGE_HOST);

        Ok(Session { client })
    }

    // Fetches a page with the session cookies attached.
    pub(crate) fn get(&self, url: &str) -> Result<String> {
        let response = self.client.get(url)
            .send()
            .with_context(|| format!("Failed to request {}", url))?;
        response.error_for_status()
            .with_context(|| format!("Request to {} was refused", url))?
            .text()
            .context("Failed to read response text")
    }

    // Sends one url-encoded form and returns the raw response body.
    pub(crate) fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<String> {
        let response = self.client.post(url)
            .form(form)
            .send()
            .with_context(|| format!("Failed to post to {}", url))?;
        response.error_for_status()
            .with_context(|| format!("Post to {} was refused", url))?
            .text()
            .context("Failed to read response text")
    }
}

impl RowSource for Session {
    // Asks the grades view to render the children of one collapsed row.
    fn expand(&self, row_id: &str) -> Result<String> {
        self.post_form(GRADES_URL, &[
            ("javax.faces.partial.ajax", "true"),
            ("javax.faces.partial.render", "mainBilanForm:treeTable"),
            ("mainBilanForm:treeTable_expand", row_id),
        ])
    }
}

// Partial-update responses wrap the fresh markup or JSON in an escaped
// comment: <update id="..."><![CDATA[ ... ]]></update>. Returns the interior.
pub(crate) fn extract_cdata(body: &str) -> Result<&str> {
    let open = "![CDATA[";
    let start = body.find(open)
        .map(|index| index + open.len())
        .ok_or_else(|| anyhow!("Partial-update response has no CDATA region"))?;
    let end = body[start..].find("]]")
        .map(|index| start + index)
        .ok_or_else(|| anyhow!("Partial-update response has an unterminated CDATA region"))?;
    Ok(&body[start..end])
}
