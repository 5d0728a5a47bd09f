//! Ordered classification tables. Declaration order is priority: the
//! first matching row wins wherever a single answer is wanted.

use crate::models::infra::ServiceCategory;
use crate::models::infra::ServiceCategory::*;

/// A pattern that identifies one provider-backed service.
#[derive(Debug, Clone, Copy)]
pub struct ServiceRule {
    pub pattern: &'static str,
    pub category: ServiceCategory,
    pub provider: &'static str,
    pub service_name: &'static str,
}

const fn rule(
    pattern: &'static str,
    category: ServiceCategory,
    provider: &'static str,
    service_name: &'static str,
) -> ServiceRule {
    ServiceRule {
        pattern,
        category,
        provider,
        service_name,
    }
}

/// A provider recognised by any of several substrings of a record value.
#[derive(Debug, Clone, Copy)]
pub struct ProviderRule {
    pub patterns: &'static [&'static str],
    pub provider: &'static str,
    pub service_name: &'static str,
}

/// Exact npm package name → service.
pub const DEPENDENCY_RULES: &[ServiceRule] = &[
    rule("@supabase/supabase-js", Database, "supabase", "Supabase Database"),
    rule("@supabase/ssr", Auth, "supabase", "Supabase Auth"),
    rule("@planetscale/database", Database, "planetscale", "PlanetScale"),
    rule("@neondatabase/serverless", Database, "neon", "Neon Database"),
    rule("pg", Database, "postgres", "PostgreSQL"),
    rule("mysql2", Database, "mysql", "MySQL"),
    rule("@sveltejs/adapter-cloudflare", Hosting, "cloudflare", "Cloudflare Pages"),
    rule("@sveltejs/adapter-vercel", Hosting, "vercel", "Vercel"),
    rule("@sveltejs/adapter-netlify", Hosting, "netlify", "Netlify"),
    rule("@aws-sdk/client-s3", Storage, "aws", "AWS S3"),
    rule("@sentry/sveltekit", Monitoring, "sentry", "Sentry"),
    rule("@sentry/browser", Monitoring, "sentry", "Sentry"),
    rule("@sentry/cloudflare", Monitoring, "sentry", "Sentry (Cloudflare)"),
    rule("@vercel/analytics", Analytics, "vercel", "Vercel Analytics"),
    rule("posthog-js", Analytics, "posthog", "PostHog"),
    rule("plausible-tracker", Analytics, "plausible", "Plausible"),
    rule("@auth/sveltekit", Auth, "authjs", "Auth.js"),
    rule("@clerk/clerk-sdk-node", Auth, "clerk", "Clerk"),
    rule("next-auth", Auth, "nextauth", "NextAuth.js"),
];

/// Substring of an upper-cased env var name → service.
pub const ENV_RULES: &[ServiceRule] = &[
    rule("SUPABASE", Database, "supabase", "Supabase"),
    rule("SENTRY", Monitoring, "sentry", "Sentry"),
    rule("CLOUDFLARE_R2", Storage, "cloudflare", "Cloudflare R2"),
    rule("AWS_S3", Storage, "aws", "AWS S3"),
    rule("STRIPE", External, "stripe", "Stripe"),
    rule("RESEND", Email, "resend", "Resend"),
    rule("SENDGRID", Email, "sendgrid", "SendGrid"),
    rule("POSTMARK", Email, "postmark", "Postmark"),
    rule("PLAUSIBLE", Analytics, "plausible", "Plausible"),
    rule("POSTHOG", Analytics, "posthog", "PostHog"),
    rule("GA_", Analytics, "google", "Google Analytics"),
];

/// Nameserver substring → DNS provider display name.
pub const NAMESERVER_RULES: &[(&str, &str)] = &[
    ("cloudflare.com", "Cloudflare"),
    ("awsdns", "AWS Route 53"),
    ("googledomains.com", "Google Domains"),
    ("domaincontrol.com", "GoDaddy"),
    ("name-services.com", "Namecheap"),
    ("dnsmadeeasy.com", "DNS Made Easy"),
    ("ventraip", "VentraIP"),
    ("digitalocean.com", "DigitalOcean"),
];

/// A/AAAA/CNAME value substrings → hosting provider.
pub const HOSTING_RULES: &[ProviderRule] = &[
    ProviderRule {
        patterns: &["pages.dev", "cloudflare"],
        provider: "cloudflare",
        service_name: "Cloudflare Pages",
    },
    ProviderRule {
        patterns: &["vercel"],
        provider: "vercel",
        service_name: "Vercel",
    },
    ProviderRule {
        patterns: &["netlify"],
        provider: "netlify",
        service_name: "Netlify",
    },
    ProviderRule {
        patterns: &["fly.dev", "fly.io"],
        provider: "flyio",
        service_name: "Fly.io",
    },
    ProviderRule {
        patterns: &["herokuapp.com"],
        provider: "heroku",
        service_name: "Heroku",
    },
    ProviderRule {
        patterns: &["railway.app"],
        provider: "railway",
        service_name: "Railway",
    },
];

/// MX value substrings → email provider.
pub const EMAIL_RULES: &[ProviderRule] = &[
    ProviderRule {
        patterns: &["google", "gmail"],
        provider: "google",
        service_name: "Google Workspace",
    },
    ProviderRule {
        patterns: &["outlook", "microsoft"],
        provider: "microsoft",
        service_name: "Microsoft 365",
    },
    ProviderRule {
        patterns: &["protonmail"],
        provider: "proton",
        service_name: "ProtonMail",
    },
    ProviderRule {
        patterns: &["zoho"],
        provider: "zoho",
        service_name: "Zoho Mail",
    },
    ProviderRule {
        patterns: &["mailgun"],
        provider: "mailgun",
        service_name: "Mailgun",
    },
    ProviderRule {
        patterns: &["sendgrid"],
        provider: "sendgrid",
        service_name: "SendGrid",
    },
];

// Tech stack: package name → label.

pub const FRAMEWORK_PACKAGES: &[(&str, &str)] = &[
    ("@sveltejs/kit", "sveltekit"),
    ("svelte", "svelte"),
    ("next", "nextjs"),
    ("react", "react"),
    ("@angular/core", "angular"),
    ("nuxt", "nuxt"),
    ("vue", "vue"),
    ("astro", "astro"),
];

pub const CSS_PACKAGES: &[(&str, &str)] = &[
    ("tailwindcss", "tailwind"),
    ("@skeletonlabs/skeleton", "skeleton"),
    ("@skeletonlabs/skeleton-svelte", "skeleton"),
    ("daisyui", "daisyui"),
    ("bootstrap", "bootstrap"),
];

pub const TEST_PACKAGES: &[(&str, &str)] = &[
    ("@playwright/test", "playwright"),
    ("cypress", "cypress"),
    ("puppeteer", "puppeteer"),
    ("jest", "jest"),
    ("vitest", "vitest"),
];

pub const BUILD_TOOL_PACKAGES: &[(&str, &str)] = &[
    ("vite", "vite"),
    ("webpack", "webpack"),
    ("esbuild", "esbuild"),
];

pub const ICON_PACKAGES: &[(&str, &str)] = &[
    ("@lucide/svelte", "lucide"),
    ("lucide-react", "lucide"),
    ("@heroicons/react", "heroicons"),
];

/// Lockfile → package manager, checked in order; npm when none match.
pub const LOCKFILES: &[(&str, &str)] = &[
    ("pnpm-lock.yaml", "pnpm"),
    ("yarn.lock", "yarn"),
    ("bun.lockb", "bun"),
];
