//! Website page fragments.

use nbpublish_markdown::passes::{self, finish_page, headings, missing_sections};
use nbpublish_markdown::{render_fragment, select_web_content};
use nbpublish_notebook::NotebookDocument;
use nbpublish_shared::{DestinationKind, Result, Warning};

use super::{FinishContext, Finished, Finisher};

/// Reduces a notebook to the Markdown the site renders.
pub struct WebsiteFinisher;

impl Finisher for WebsiteFinisher {
    fn kind(&self) -> DestinationKind {
        DestinationKind::Website
    }

    fn finish(&self, doc: NotebookDocument, ctx: &FinishContext<'_>) -> Result<Finished> {
        let options = &ctx.destination.options;
        let mut warnings = Vec::new();

        let rendered = render_fragment(&doc);
        let mut page = match select_web_content(&rendered) {
            Some(selected) => selected,
            None => {
                warnings.push(Warning::doc(
                    "no <!-- BEGIN WEB CONTENT --> regions; publishing the whole rendering",
                ));
                rendered
            }
        };

        if options.replace_purple_hr {
            page = passes::replace_purple_hr(&page);
        }

        if let Some(footer) = &options.footer {
            page = match passes::replace_footer(&page, footer) {
                Some(replaced) => replaced,
                None => format!("{}\n\n{}", page.trim_end(), footer.trim_end()),
            };
        }

        warnings.extend(
            missing_sections(&headings(&page), &options.required_sections)
                .into_iter()
                .map(|s| Warning::doc(format!("missing required section '{s}'"))),
        );

        let page = finish_page(&page, options.site_url.as_ref());
        Ok(Finished {
            bytes: page.into_bytes(),
            warnings,
        })
    }
}
